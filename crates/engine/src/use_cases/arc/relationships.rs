//! Links between arcs: creation rules, network analysis, link suggestions
//! and follow-up arcs branched from a completed arc's outcome.
//!
//! An arc's `predecessor_arc_id` counts as an implicit sequel link from the
//! predecessor, so successor arcs show up in the network without a stored
//! relationship.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use visualdm_domain::{
    relationship_violations, ArcId, ArcInfluenceLevel, ArcRelationship, ArcRelationshipType,
    ArcStatus, ArcType, RelationshipId, StoryArc,
};

use super::branching::{
    evaluate_branching_conditions, BranchCategory, OutcomeBranchingEngine, OutcomeData,
    PlayerChoice, TriggeredBranch,
};
use super::ArcError;
use crate::infrastructure::ports::{ArcFilter, ArcRepo, ClockPort, RelationshipRepo};

const MAX_SUGGESTIONS: usize = 10;
const MAX_MOST_CONNECTED: usize = 5;
const MAX_FOLLOW_UPS: usize = 5;
/// Arcs that started within this many days of each other run in parallel.
const PARALLEL_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct NewRelationship {
    pub target_arc_id: ArcId,
    pub relationship_type: ArcRelationshipType,
    #[serde(default)]
    pub influence_level: Option<ArcInfluenceLevel>,
    #[serde(default)]
    pub influence_data: BTreeMap<String, String>,
    #[serde(default)]
    pub narrative_connection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedArc {
    pub arc_id: ArcId,
    pub title: String,
    pub connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeChain {
    pub chain_id: String,
    pub arc_ids: Vec<ArcId>,
    pub arc_titles: Vec<String>,
    pub length: usize,
    pub total_estimated_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipNetwork {
    pub total_arcs: usize,
    pub total_relationships: usize,
    pub average_connections_per_arc: f64,
    pub orphaned_arcs: Vec<ArcId>,
    pub circular_dependencies: Vec<Vec<ArcId>>,
    pub most_connected_arcs: Vec<ConnectedArc>,
    pub narrative_chains: Vec<NarrativeChain>,
    pub issues: Vec<String>,
    /// "good" when there are no issues, otherwise "needs_attention"
    pub network_health: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipSuggestion {
    pub source_arc_id: ArcId,
    pub target_arc_id: ArcId,
    pub relationship_type: ArcRelationshipType,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub themes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub factions: Vec<String>,
}

fn default_follow_up_count() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpRequest {
    #[serde(default)]
    pub outcome: OutcomeData,
    #[serde(default)]
    pub player_choices: Vec<PlayerChoice>,
    #[serde(default = "default_follow_up_count")]
    pub count: usize,
}

impl Default for FollowUpRequest {
    fn default() -> Self {
        Self {
            outcome: OutcomeData::default(),
            player_choices: Vec::new(),
            count: default_follow_up_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowUpMetadata {
    pub outcome: OutcomeData,
    pub player_choices_count: usize,
    pub total_branches_evaluated: usize,
}

/// A suggested arc growing out of a completed one. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowUpArc {
    pub id: String,
    pub arc_type: ArcType,
    pub source_arc_id: ArcId,
    #[serde(flatten)]
    pub branch: TriggeredBranch,
    pub generation_metadata: FollowUpMetadata,
}

pub struct ArcRelationshipService {
    arcs: Arc<dyn ArcRepo>,
    relationships: Arc<dyn RelationshipRepo>,
    branching: OutcomeBranchingEngine,
    clock: Arc<dyn ClockPort>,
}

impl ArcRelationshipService {
    pub fn new(
        arcs: Arc<dyn ArcRepo>,
        relationships: Arc<dyn RelationshipRepo>,
        branching: OutcomeBranchingEngine,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            arcs,
            relationships,
            branching,
            clock,
        }
    }

    async fn load(&self, arc_id: ArcId) -> Result<StoryArc, ArcError> {
        self.arcs
            .get(arc_id)
            .await?
            .ok_or_else(|| ArcError::not_found("Arc", arc_id))
    }

    /// Link `source_id` to another arc after checking the pairing rules.
    pub async fn create_relationship(
        &self,
        source_id: ArcId,
        request: NewRelationship,
    ) -> Result<ArcRelationship, ArcError> {
        let source = self.load(source_id).await?;
        let target = self.load(request.target_arc_id).await?;
        let kind = request.relationship_type;

        let mut errors = relationship_violations(&source, &target, kind);
        let existing = self.relationships.list_for_arc(source_id).await?;
        if existing
            .iter()
            .any(|link| link.duplicates(source.id(), target.id(), kind))
        {
            errors.push(format!("A {} relationship between these arcs already exists", kind));
        }
        if !errors.is_empty() {
            return Err(ArcError::Validation(format!(
                "Invalid relationship: {}",
                errors.join("; ")
            )));
        }

        let mut relationship = ArcRelationship::new(source.id(), target.id(), kind, self.clock.now())
            .with_influence_level(request.influence_level.unwrap_or_default())
            .with_influence_data(request.influence_data);
        if let Some(connection) = request.narrative_connection {
            relationship = relationship.with_narrative_connection(connection);
        }
        self.relationships.save(&relationship).await?;

        tracing::info!(
            relationship_id = %relationship.id(),
            source_arc_id = %source.id(),
            target_arc_id = %target.id(),
            relationship_type = %kind,
            "Arc relationship created"
        );
        Ok(relationship)
    }

    pub async fn list_relationships(
        &self,
        arc_id: ArcId,
    ) -> Result<Vec<ArcRelationship>, ArcError> {
        self.load(arc_id).await?;
        Ok(self.relationships.list_for_arc(arc_id).await?)
    }

    pub async fn delete_relationship(&self, id: RelationshipId) -> Result<(), ArcError> {
        if self.relationships.get(id).await?.is_none() {
            return Err(ArcError::not_found("ArcRelationship", id));
        }
        self.relationships.delete(id).await?;
        tracing::info!(relationship_id = %id, "Arc relationship deleted");
        Ok(())
    }

    pub async fn analyze_relationship_network(&self) -> Result<RelationshipNetwork, ArcError> {
        let arcs = self.arcs.list(ArcFilter::default()).await?;
        let links = self.relationships.list().await?;
        Ok(analyze_network(&arcs, &links))
    }

    /// Up to ten unlinked arc pairs that look like they belong together.
    pub async fn suggest_relationship_opportunities(
        &self,
    ) -> Result<Vec<RelationshipSuggestion>, ArcError> {
        let arcs = self.arcs.list(ArcFilter::default()).await?;
        let links = self.relationships.list().await?;
        Ok(suggest_links(&arcs, &links))
    }

    /// Branch a completed arc's outcome into suggested follow-up arcs.
    pub async fn generate_dynamic_follow_up_arcs(
        &self,
        arc_id: ArcId,
        request: FollowUpRequest,
    ) -> Result<Vec<FollowUpArc>, ArcError> {
        if !(1..=MAX_FOLLOW_UPS).contains(&request.count) {
            return Err(ArcError::Validation(format!(
                "Follow-up count must be between 1 and {}",
                MAX_FOLLOW_UPS
            )));
        }

        let arc = self.load(arc_id).await?;
        if arc.status() != ArcStatus::Completed {
            return Err(ArcError::InvalidTransition(format!(
                "Arc {} is {}, follow-ups need a completed arc",
                arc_id,
                arc.status()
            )));
        }

        let mut outcome = request.outcome;
        if outcome.success_level.is_none() {
            if let Some(record) = self.arcs.get_completion(arc_id).await? {
                outcome.success_level = Some(record.completion_result().to_string());
            }
        }

        let related: Vec<ArcId> = self
            .relationships
            .list_for_arc(arc_id)
            .await?
            .iter()
            .map(|link| {
                if link.source_arc_id() == arc_id {
                    link.target_arc_id()
                } else {
                    link.source_arc_id()
                }
            })
            .collect();

        let branches = self
            .branching
            .generate_outcome_branches(&arc, &outcome, &request.player_choices, &related)
            .await;
        let triggered = evaluate_branching_conditions(&arc, &outcome, branches);
        let evaluated = triggered.len();

        let follow_ups: Vec<FollowUpArc> = triggered
            .into_iter()
            .take(request.count)
            .enumerate()
            .map(|(i, branch)| FollowUpArc {
                id: format!("follow_up_{}_{}", arc_id, i),
                arc_type: follow_up_type(branch.branch.branch_category, arc.arc_type()),
                source_arc_id: arc_id,
                branch,
                generation_metadata: FollowUpMetadata {
                    outcome: outcome.clone(),
                    player_choices_count: request.player_choices.len(),
                    total_branches_evaluated: evaluated,
                },
            })
            .collect();

        tracing::info!(
            arc_id = %arc_id,
            follow_ups = follow_ups.len(),
            success_level = outcome.success_level(),
            "Follow-up arcs generated"
        );
        Ok(follow_ups)
    }
}

fn follow_up_type(category: BranchCategory, source: ArcType) -> ArcType {
    match category {
        BranchCategory::CharacterFocused => ArcType::Character,
        BranchCategory::WorldShaping => match source {
            ArcType::Global | ArcType::Regional => ArcType::Global,
            _ => ArcType::Regional,
        },
        _ => source,
    }
}

/// Directed (predecessor to successor) and undirected adjacency over the
/// arcs that exist. Links to missing arcs are ignored.
struct Graph {
    predecessors: HashMap<ArcId, Vec<ArcId>>,
    successors: HashMap<ArcId, Vec<ArcId>>,
    related: HashMap<ArcId, Vec<ArcId>>,
    edges: usize,
}

impl Graph {
    fn build(arcs: &[StoryArc], links: &[ArcRelationship]) -> Self {
        let known: HashSet<ArcId> = arcs.iter().map(StoryArc::id).collect();
        let mut graph = Self {
            predecessors: HashMap::new(),
            successors: HashMap::new(),
            related: HashMap::new(),
            edges: 0,
        };

        for link in links {
            let (source, target) = (link.source_arc_id(), link.target_arc_id());
            if !known.contains(&source) || !known.contains(&target) {
                continue;
            }
            match link.relationship_type().ordering(source, target) {
                Some((before, after)) => graph.add_sequence(before, after),
                None => {
                    graph.related.entry(source).or_default().push(target);
                    graph.related.entry(target).or_default().push(source);
                    graph.edges += 1;
                }
            }
        }

        for arc in arcs {
            let Some(before) = arc.predecessor_arc_id() else {
                continue;
            };
            let already_linked = graph
                .successors
                .get(&before)
                .is_some_and(|next| next.contains(&arc.id()));
            if known.contains(&before) && !already_linked {
                graph.add_sequence(before, arc.id());
            }
        }
        graph
    }

    fn add_sequence(&mut self, before: ArcId, after: ArcId) {
        self.successors.entry(before).or_default().push(after);
        self.predecessors.entry(after).or_default().push(before);
        self.edges += 1;
    }

    fn neighbours<'a>(map: &'a HashMap<ArcId, Vec<ArcId>>, id: &ArcId) -> &'a [ArcId] {
        map.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    fn connections(&self, id: &ArcId) -> usize {
        Self::neighbours(&self.predecessors, id).len()
            + Self::neighbours(&self.successors, id).len()
            + Self::neighbours(&self.related, id).len()
    }

    fn linked(&self, a: ArcId, b: ArcId) -> bool {
        [&self.predecessors, &self.successors, &self.related]
            .iter()
            .any(|map| Self::neighbours(map, &a).contains(&b))
    }

    /// Cycles along predecessor edges, each closed by repeating its first arc.
    fn cycles(&self, order: &[ArcId]) -> Vec<Vec<ArcId>> {
        fn visit(
            graph: &Graph,
            node: ArcId,
            visited: &mut HashSet<ArcId>,
            stack: &mut Vec<ArcId>,
            cycles: &mut Vec<Vec<ArcId>>,
        ) {
            if let Some(start) = stack.iter().position(|id| *id == node) {
                let mut cycle = stack[start..].to_vec();
                cycle.push(node);
                cycles.push(cycle);
                return;
            }
            if !visited.insert(node) {
                return;
            }
            stack.push(node);
            for &next in Graph::neighbours(&graph.predecessors, &node) {
                visit(graph, next, visited, stack, cycles);
            }
            stack.pop();
        }

        let mut visited = HashSet::new();
        let mut cycles = Vec::new();
        for &id in order {
            if !visited.contains(&id) {
                visit(self, id, &mut visited, &mut Vec::new(), &mut cycles);
            }
        }
        cycles
    }

    /// Chains start at arcs with no predecessor and follow single successors.
    fn chains(&self, order: &[ArcId]) -> Vec<Vec<ArcId>> {
        let mut visited = HashSet::new();
        let mut chains = Vec::new();

        for &start in order {
            if visited.contains(&start) || !Self::neighbours(&self.predecessors, &start).is_empty()
            {
                continue;
            }
            let mut chain = vec![start];
            let mut current = start;
            while let [next] = Self::neighbours(&self.successors, &current) {
                if chain.contains(next) {
                    break;
                }
                chain.push(*next);
                current = *next;
            }
            if chain.len() > 1 {
                visited.extend(chain.iter().copied());
                chains.push(chain);
            }
        }
        chains
    }
}

/// Structure of the arc network: orphans, cycles, hubs and sequel chains.
pub fn analyze_network(arcs: &[StoryArc], links: &[ArcRelationship]) -> RelationshipNetwork {
    let graph = Graph::build(arcs, links);
    let by_id: HashMap<ArcId, &StoryArc> = arcs.iter().map(|arc| (arc.id(), arc)).collect();
    let order: Vec<ArcId> = arcs.iter().map(StoryArc::id).collect();
    let title = |id: &ArcId| by_id.get(id).map(|arc| arc.title().to_string()).unwrap_or_default();

    let circular_dependencies = graph.cycles(&order);
    let issues: Vec<String> = circular_dependencies
        .iter()
        .map(|cycle| {
            let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
            format!("Circular dependency: {}", path.join(" -> "))
        })
        .collect();

    let orphaned_arcs = order
        .iter()
        .copied()
        .filter(|id| graph.connections(id) == 0)
        .collect();

    let mut most_connected: Vec<ConnectedArc> = order
        .iter()
        .map(|id| ConnectedArc {
            arc_id: *id,
            title: title(id),
            connections: graph.connections(id),
        })
        .filter(|arc| arc.connections > 0)
        .collect();
    most_connected.sort_by(|a, b| b.connections.cmp(&a.connections));
    most_connected.truncate(MAX_MOST_CONNECTED);

    let narrative_chains = graph
        .chains(&order)
        .into_iter()
        .enumerate()
        .map(|(i, arc_ids)| NarrativeChain {
            chain_id: format!("chain_{}", i + 1),
            arc_titles: arc_ids.iter().map(title).collect(),
            length: arc_ids.len(),
            total_estimated_duration: arc_ids
                .iter()
                .filter_map(|id| by_id.get(id)?.estimated_duration_hours())
                .sum(),
            arc_ids,
        })
        .collect();

    let average = if arcs.is_empty() {
        0.0
    } else {
        graph.edges as f64 / arcs.len() as f64
    };

    RelationshipNetwork {
        total_arcs: arcs.len(),
        total_relationships: graph.edges,
        average_connections_per_arc: (average * 100.0).round() / 100.0,
        orphaned_arcs,
        circular_dependencies,
        most_connected_arcs: most_connected,
        narrative_chains,
        network_health: if issues.is_empty() { "good" } else { "needs_attention" },
        issues,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timing {
    Sequential,
    Parallel,
}

fn timing(first: &StoryArc, second: &StoryArc) -> Option<Timing> {
    let second_start = second.started_at()?;
    if first.completed_at().is_some_and(|end| end <= second_start) {
        return Some(Timing::Sequential);
    }
    let first_start = first.started_at()?;
    ((first_start - second_start).num_days().abs() < PARALLEL_WINDOW_DAYS)
        .then_some(Timing::Parallel)
}

fn shared(left: &[String], right: &[String]) -> Vec<String> {
    let mut overlap: Vec<String> = Vec::new();
    for item in left {
        if right.contains(item) && !overlap.contains(item) {
            overlap.push(item.clone());
        }
    }
    overlap
}

fn same_person(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

fn pair_suggestions(first: &StoryArc, second: &StoryArc) -> Vec<RelationshipSuggestion> {
    let themes = shared(first.themes(), second.themes());
    let factions = shared(first.faction_ids(), second.faction_ids());
    let timing = timing(first, second);
    let character_link = same_person(first.character_id(), second.character_id())
        || same_person(first.character_id(), second.npc_id())
        || same_person(first.npc_id(), second.character_id());

    let suggestion = |kind, confidence, reasoning: String| RelationshipSuggestion {
        source_arc_id: first.id(),
        target_arc_id: second.id(),
        relationship_type: kind,
        confidence,
        reasoning,
        themes: Vec::new(),
        factions: Vec::new(),
    };

    let mut suggestions = Vec::new();
    if themes.len() >= 2 {
        suggestions.push(RelationshipSuggestion {
            themes: themes.clone(),
            ..suggestion(
                ArcRelationshipType::ThematicLink,
                ((7 + themes.len()) as f64 / 10.0).min(1.0),
                format!("Strong thematic overlap: {}", themes.join(", ")),
            )
        });
    }
    if !factions.is_empty() {
        let kind = if timing == Some(Timing::Parallel) {
            ArcRelationshipType::Parallel
        } else {
            ArcRelationshipType::Consequence
        };
        suggestions.push(RelationshipSuggestion {
            factions: factions.clone(),
            ..suggestion(kind, 0.8, format!("Shared factions: {}", factions.join(", ")))
        });
    }
    if character_link {
        let kind = if timing == Some(Timing::Sequential) {
            ArcRelationshipType::Continuation
        } else {
            ArcRelationshipType::ThematicLink
        };
        suggestions.push(suggestion(
            kind,
            0.9,
            "Character connection between arcs".to_string(),
        ));
    }
    if timing == Some(Timing::Sequential) && !(factions.is_empty() && themes.is_empty()) {
        suggestions.push(suggestion(
            ArcRelationshipType::Sequel,
            0.8,
            "Sequential timing with shared elements suggests sequel relationship".to_string(),
        ));
    }
    suggestions
}

/// Candidate links between arcs that are not yet connected, most confident first.
pub fn suggest_links(arcs: &[StoryArc], links: &[ArcRelationship]) -> Vec<RelationshipSuggestion> {
    let graph = Graph::build(arcs, links);
    let mut suggestions = Vec::new();

    for (i, first) in arcs.iter().enumerate() {
        for second in &arcs[i + 1..] {
            if graph.linked(first.id(), second.id()) {
                continue;
            }
            suggestions.extend(pair_suggestions(first, second));
        }
    }

    suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}
