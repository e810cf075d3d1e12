//! Outcome branching: candidate follow-up storylines for a completed arc.
//!
//! Branches are grouped by category. The LLM drafts them when configured;
//! any category it leaves empty (or the whole set, when the call or parse
//! fails) comes from fixed templates keyed on the success level.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use visualdm_domain::{ArcId, ArcRelationshipType, ArcType, StoryArc};

use super::generator::parse_json;
use crate::infrastructure::ports::{ChatMessage, LlmPort, LlmRequest};

const BRANCH_SYSTEM_PROMPT: &str = "You are a narrative designer for a tabletop RPG. \
Reply with a single JSON object and nothing else.";

const MAX_TRIGGERED: usize = 5;

const ENGAGING_TONES: [&str; 4] = ["triumph", "tragedy", "mystery", "revelation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCategory {
    ImmediateConsequences,
    LongTermImplications,
    CharacterFocused,
    WorldShaping,
    ConflictResolution,
}

impl BranchCategory {
    pub const ALL: [BranchCategory; 5] = [
        BranchCategory::ImmediateConsequences,
        BranchCategory::LongTermImplications,
        BranchCategory::CharacterFocused,
        BranchCategory::WorldShaping,
        BranchCategory::ConflictResolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImmediateConsequences => "immediate_consequences",
            Self::LongTermImplications => "long_term_implications",
            Self::CharacterFocused => "character_focused",
            Self::WorldShaping => "world_shaping",
            Self::ConflictResolution => "conflict_resolution",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchComplexity {
    Low,
    #[default]
    Medium,
    High,
}

impl BranchComplexity {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// One possible storyline that could follow a completed arc.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeBranch {
    pub title: String,
    pub description: String,
    pub trigger_conditions: String,
    pub themes: Vec<String>,
    pub estimated_complexity: BranchComplexity,
    pub key_npcs: Vec<String>,
    pub relationship_type: ArcRelationshipType,
    pub emotional_tone: String,
    pub narrative_hook: String,
    pub branch_category: BranchCategory,
    /// "llm" or "template"
    pub generated_via: &'static str,
}

/// How an arc ended, as reported by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeData {
    pub outcome_type: Option<String>,
    /// success, failure, partial (or a synonym such as triumph, defeat, mixed)
    pub success_level: Option<String>,
    pub final_outcome: Option<String>,
    pub world_changes: Option<String>,
    pub character_development: Option<String>,
    pub unresolved_elements: Option<String>,
}

impl OutcomeData {
    pub fn outcome_type(&self) -> &str {
        self.outcome_type.as_deref().unwrap_or("standard")
    }

    pub fn success_level(&self) -> &str {
        self.success_level.as_deref().unwrap_or("partial")
    }
}

/// A decision the players made during the arc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerChoice {
    pub context: String,
    pub option: String,
    pub consequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredBranch {
    #[serde(flatten)]
    pub branch: OutcomeBranch,
    pub trigger_probability: f64,
    pub priority: u32,
}

#[derive(Debug, Deserialize)]
struct BranchDraft {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    trigger_conditions: String,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    estimated_complexity: Option<String>,
    #[serde(default)]
    key_npcs: Vec<String>,
    #[serde(default)]
    relationship_type: Option<String>,
    #[serde(default)]
    emotional_tone: Option<String>,
    #[serde(default)]
    narrative_hook: Option<String>,
}

impl BranchDraft {
    fn into_branch(self, category: BranchCategory) -> Option<OutcomeBranch> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let relationship_type = self
            .relationship_type
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(ArcRelationshipType::Sequel);
        let narrative_hook = self
            .narrative_hook
            .filter(|hook| !hook.trim().is_empty())
            .unwrap_or_else(|| self.description.clone());

        Some(OutcomeBranch {
            title,
            description: self.description,
            trigger_conditions: self.trigger_conditions,
            themes: self.themes,
            estimated_complexity: self
                .estimated_complexity
                .as_deref()
                .map(BranchComplexity::parse)
                .unwrap_or_default(),
            key_npcs: self.key_npcs,
            relationship_type,
            emotional_tone: self.emotional_tone.unwrap_or_else(|| "continuation".to_string()),
            narrative_hook,
            branch_category: category,
            generated_via: "llm",
        })
    }
}

pub struct OutcomeBranchingEngine {
    llm: Option<Arc<dyn LlmPort>>,
}

impl OutcomeBranchingEngine {
    pub fn new(llm: Option<Arc<dyn LlmPort>>) -> Self {
        Self { llm }
    }

    /// Every candidate branch for `arc`, grouped by category.
    ///
    /// Never empty: each category holds at least one branch.
    pub async fn generate_outcome_branches(
        &self,
        arc: &StoryArc,
        outcome: &OutcomeData,
        choices: &[PlayerChoice],
        related_arcs: &[ArcId],
    ) -> BTreeMap<BranchCategory, Vec<OutcomeBranch>> {
        let mut branches = template_branches(arc, outcome);
        let Some(llm) = &self.llm else {
            return branches;
        };

        let request = LlmRequest::new(vec![ChatMessage::user(build_branch_prompt(
            arc,
            outcome,
            choices,
            related_arcs,
        ))])
        .with_system_prompt(BRANCH_SYSTEM_PROMPT)
        .with_temperature(0.8)
        .with_max_tokens(4000)
        .expecting_json();

        let response = match llm.generate(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(arc_id = %arc.id(), error = %e, "Branch generation failed, using templates");
                return branches;
            }
        };

        let Some(drafted) = parse_branches(&response.content) else {
            tracing::warn!(arc_id = %arc.id(), "Unparseable branch reply, using templates");
            return branches;
        };

        for (category, drafted) in drafted {
            if !drafted.is_empty() {
                branches.insert(category, drafted);
            }
        }
        branches
    }
}

/// Branches whose trigger fits the outcome, scored and ordered by priority
/// then probability. At most five are kept.
pub fn evaluate_branching_conditions(
    arc: &StoryArc,
    outcome: &OutcomeData,
    branches: BTreeMap<BranchCategory, Vec<OutcomeBranch>>,
) -> Vec<TriggeredBranch> {
    let level = outcome.success_level().to_lowercase();

    let mut triggered: Vec<TriggeredBranch> = branches
        .into_values()
        .flatten()
        .filter(|branch| trigger_matches(branch, arc, &level))
        .map(|branch| TriggeredBranch {
            trigger_probability: trigger_probability(&branch, &level),
            priority: branch_priority(&branch, arc),
            branch,
        })
        .collect();

    triggered.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.trigger_probability.total_cmp(&a.trigger_probability))
    });
    triggered.truncate(MAX_TRIGGERED);
    triggered
}

fn trigger_matches(branch: &OutcomeBranch, arc: &StoryArc, level: &str) -> bool {
    let trigger = branch.trigger_conditions.to_lowercase();

    let by_outcome = (trigger.contains("success") && matches!(level, "success" | "triumph"))
        || (trigger.contains("failure") && matches!(level, "failure" | "defeat"))
        || (trigger.contains("partial") && matches!(level, "partial" | "mixed"))
        || trigger.contains("completion");
    if by_outcome {
        return true;
    }

    branch.themes.iter().any(|theme| {
        arc.themes()
            .iter()
            .any(|own| own.eq_ignore_ascii_case(theme))
    })
}

fn trigger_probability(branch: &OutcomeBranch, level: &str) -> f64 {
    let mut probability = 0.5;
    if branch.trigger_conditions.to_lowercase().contains(level) {
        probability += 0.3;
    }
    probability += match branch.estimated_complexity {
        BranchComplexity::Low => 0.1,
        BranchComplexity::Medium => 0.0,
        BranchComplexity::High => -0.1,
    };
    f64::clamp(probability, 0.0, 1.0)
}

fn branch_priority(branch: &OutcomeBranch, arc: &StoryArc) -> u32 {
    let mut priority = 0;
    match (branch.branch_category, arc.arc_type()) {
        (BranchCategory::ImmediateConsequences, _) => priority += 5,
        (BranchCategory::CharacterFocused, ArcType::Character) => priority += 4,
        (BranchCategory::WorldShaping, ArcType::Global) => priority += 3,
        _ => {}
    }
    if ENGAGING_TONES.contains(&branch.emotional_tone.to_lowercase().as_str()) {
        priority += 2;
    }
    priority
}

fn parse_branches(content: &str) -> Option<BTreeMap<BranchCategory, Vec<OutcomeBranch>>> {
    let serde_json::Value::Object(map) = parse_json::<serde_json::Value>(content)? else {
        return None;
    };

    let mut parsed = BTreeMap::new();
    for category in BranchCategory::ALL {
        let Some(raw) = map.get(category.as_str()) else {
            continue;
        };
        let Ok(drafts) = serde_json::from_value::<Vec<BranchDraft>>(raw.clone()) else {
            tracing::debug!(category = category.as_str(), "Skipping malformed branch list");
            continue;
        };
        let branches: Vec<OutcomeBranch> = drafts
            .into_iter()
            .filter_map(|draft| draft.into_branch(category))
            .collect();
        parsed.insert(category, branches);
    }
    Some(parsed)
}

struct Template {
    title: String,
    description: &'static str,
    tone: &'static str,
    themes: [&'static str; 2],
}

fn template_branches(
    arc: &StoryArc,
    outcome: &OutcomeData,
) -> BTreeMap<BranchCategory, Vec<OutcomeBranch>> {
    let level = outcome.success_level();
    let trigger = format!("Arc completed with {} success", level);

    let (immediate, long_term) = match level {
        "success" => (
            Template {
                title: format!("Aftermath of {}", arc.title()),
                description: "Deal with the immediate consequences of your success",
                tone: "triumph",
                themes: ["victory", "responsibility"],
            },
            Template {
                title: "The New Order".to_string(),
                description: "Navigate the world changed by your actions",
                tone: "transformation",
                themes: ["change", "adaptation"],
            },
        ),
        "failure" => (
            Template {
                title: "Rising from the Ashes".to_string(),
                description: "Recover from the setback and find a new path forward",
                tone: "determination",
                themes: ["redemption", "perseverance"],
            },
            Template {
                title: "Seeds of Hope".to_string(),
                description: "Work to rebuild what was lost",
                tone: "hope",
                themes: ["rebuilding", "hope"],
            },
        ),
        _ => (
            Template {
                title: "Unfinished Business".to_string(),
                description: "Address the remaining challenges left by your partial success",
                tone: "resolve",
                themes: ["completion", "determination"],
            },
            Template {
                title: "The Ongoing Struggle".to_string(),
                description: "Continue fighting for what you believe in",
                tone: "perseverance",
                themes: ["struggle", "conviction"],
            },
        ),
    };

    let outcome_branch = |template: Template, category| OutcomeBranch {
        title: template.title,
        description: template.description.to_string(),
        trigger_conditions: trigger.clone(),
        themes: Vec::from(template.themes.map(str::to_string)),
        estimated_complexity: BranchComplexity::Medium,
        key_npcs: Vec::new(),
        relationship_type: ArcRelationshipType::Sequel,
        emotional_tone: template.tone.to_string(),
        narrative_hook: template.description.to_string(),
        branch_category: category,
        generated_via: "template",
    };

    let mut branches = BTreeMap::new();
    branches.insert(
        BranchCategory::ImmediateConsequences,
        vec![outcome_branch(immediate, BranchCategory::ImmediateConsequences)],
    );
    branches.insert(
        BranchCategory::LongTermImplications,
        vec![outcome_branch(long_term, BranchCategory::LongTermImplications)],
    );

    for category in [
        BranchCategory::CharacterFocused,
        BranchCategory::WorldShaping,
        BranchCategory::ConflictResolution,
    ] {
        branches.insert(
            category,
            vec![OutcomeBranch {
                title: "Personal Growth".to_string(),
                description: "A character-focused continuation exploring personal development"
                    .to_string(),
                trigger_conditions: "Arc completion".to_string(),
                themes: vec!["growth".to_string(), "development".to_string()],
                estimated_complexity: BranchComplexity::Low,
                key_npcs: Vec::new(),
                relationship_type: ArcRelationshipType::Continuation,
                emotional_tone: "introspection".to_string(),
                narrative_hook: "Focus on character development".to_string(),
                branch_category: category,
                generated_via: "template",
            }],
        );
    }
    branches
}

fn build_branch_prompt(
    arc: &StoryArc,
    outcome: &OutcomeData,
    choices: &[PlayerChoice],
    related_arcs: &[ArcId],
) -> String {
    let or = |value: &Option<String>, fallback: &str| {
        value.clone().unwrap_or_else(|| fallback.to_string())
    };

    let mut prompt = format!(
        "Propose follow-up storylines for a finished arc.\n\n\
         Arc: {}\nType: {}\nThemes: {}\nDescription: {}\n\n\
         Outcome type: {}\nSuccess level: {}\nFinal outcome: {}\nWorld changes: {}\n\
         Character development: {}\nUnresolved elements: {}\n\n",
        arc.title(),
        arc.arc_type(),
        arc.themes().join(", "),
        arc.description(),
        outcome.outcome_type(),
        outcome.success_level(),
        or(&outcome.final_outcome, "completed"),
        or(&outcome.world_changes, "minimal"),
        or(&outcome.character_development, "moderate"),
        or(&outcome.unresolved_elements, "few"),
    );

    prompt.push_str("Key player choices:\n");
    if choices.is_empty() {
        prompt.push_str("- none recorded\n");
    }
    for (i, choice) in choices.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {}: {} -> {}\n",
            i + 1,
            choice.context,
            choice.option,
            choice.consequence
        ));
    }

    let predecessor = arc
        .predecessor_arc_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string());
    let related: Vec<String> = related_arcs.iter().map(ToString::to_string).collect();
    prompt.push_str(&format!(
        "\nPredecessor arc: {}\nRelated arcs: {}\nFactions: {}\n\n",
        predecessor,
        related.join(", "),
        arc.faction_ids().join(", ")
    ));

    let categories: Vec<&str> = BranchCategory::ALL.iter().map(BranchCategory::as_str).collect();
    prompt.push_str(&format!(
        "Respond with a JSON object whose keys are {} and whose values are arrays of branches. \
         Each branch has keys: title, description, trigger_conditions, themes, \
         estimated_complexity (low|medium|high), key_npcs, relationship_type \
         (sequel|consequence|branching|continuation|thematic_link), emotional_tone, narrative_hook.",
        categories.join(", ")
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{
        FinishReason, LlmError, LlmResponse, MockLlmPort, OutputFormat,
    };
    use chrono::{TimeZone, Utc};

    fn arc(arc_type: ArcType) -> StoryArc {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        StoryArc::new("The Drowned Bell", "A bell tolls beneath the bay", arc_type, now)
            .with_themes(vec!["faith".into(), "loss".into()])
    }

    fn outcome(level: &str) -> OutcomeData {
        OutcomeData {
            success_level: Some(level.to_string()),
            ..Default::default()
        }
    }

    fn titles(branches: &[TriggeredBranch]) -> Vec<&str> {
        branches.iter().map(|t| t.branch.title.as_str()).collect()
    }

    #[tokio::test]
    async fn templates_cover_every_category_without_llm() {
        let engine = OutcomeBranchingEngine::new(None);
        let arc = arc(ArcType::Regional);

        let branches = engine
            .generate_outcome_branches(&arc, &outcome("success"), &[], &[])
            .await;

        assert_eq!(branches.len(), 5);
        let immediate = &branches[&BranchCategory::ImmediateConsequences][0];
        assert_eq!(immediate.title, "Aftermath of The Drowned Bell");
        assert_eq!(immediate.trigger_conditions, "Arc completed with success success");
        assert_eq!(branches[&BranchCategory::LongTermImplications][0].title, "The New Order");
        let growth = &branches[&BranchCategory::WorldShaping][0];
        assert_eq!(growth.title, "Personal Growth");
        assert_eq!(growth.relationship_type, ArcRelationshipType::Continuation);
        assert_eq!(growth.generated_via, "template");
    }

    #[tokio::test]
    async fn unknown_success_level_uses_partial_templates() {
        let engine = OutcomeBranchingEngine::new(None);
        let branches = engine
            .generate_outcome_branches(&arc(ArcType::Npc), &outcome("triumph"), &[], &[])
            .await;

        assert_eq!(
            branches[&BranchCategory::ImmediateConsequences][0].title,
            "Unfinished Business"
        );
        assert_eq!(
            branches[&BranchCategory::LongTermImplications][0].title,
            "The Ongoing Struggle"
        );
    }

    #[tokio::test]
    async fn llm_branches_replace_templates_per_category() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .withf(|request| {
                request.output == OutputFormat::Json
                    && request.temperature == Some(0.8)
                    && request.max_tokens == Some(4000)
                    && request.messages[0].content.contains("betrayed the abbot")
            })
            .times(1)
            .returning(|_| {
                Ok(LlmResponse {
                    content: r#"{
                        "immediate_consequences": [
                            {"title": "The Bell Tolls Again", "description": "It rings at dawn",
                             "trigger_conditions": "success", "estimated_complexity": "high",
                             "relationship_type": "consequence", "emotional_tone": "mystery"},
                            {"title": "  ", "description": "no title"}
                        ],
                        "world_shaping": "not a list"
                    }"#
                    .to_string(),
                    finish_reason: FinishReason::Stop,
                    usage: None,
                })
            });
        let engine = OutcomeBranchingEngine::new(Some(Arc::new(llm)));
        let choices = [PlayerChoice {
            context: "At the chapel".into(),
            option: "betrayed the abbot".into(),
            consequence: "the order scattered".into(),
        }];

        let branches = engine
            .generate_outcome_branches(&arc(ArcType::Global), &outcome("success"), &choices, &[])
            .await;

        let immediate = &branches[&BranchCategory::ImmediateConsequences];
        assert_eq!(immediate.len(), 1);
        assert_eq!(immediate[0].title, "The Bell Tolls Again");
        assert_eq!(immediate[0].relationship_type, ArcRelationshipType::Consequence);
        assert_eq!(immediate[0].estimated_complexity, BranchComplexity::High);
        assert_eq!(immediate[0].narrative_hook, "It rings at dawn");
        assert_eq!(immediate[0].generated_via, "llm");
        assert_eq!(branches[&BranchCategory::WorldShaping][0].generated_via, "template");
        assert_eq!(branches.len(), 5);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_templates() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_| Err(LlmError::RequestFailed("connection refused".into())));
        let engine = OutcomeBranchingEngine::new(Some(Arc::new(llm)));

        let branches = engine
            .generate_outcome_branches(&arc(ArcType::Npc), &outcome("failure"), &[], &[])
            .await;

        assert_eq!(
            branches[&BranchCategory::ImmediateConsequences][0].title,
            "Rising from the Ashes"
        );
        assert!(branches
            .values()
            .flatten()
            .all(|branch| branch.generated_via == "template"));
    }

    #[tokio::test]
    async fn character_arc_success_orders_by_priority_then_probability() {
        let engine = OutcomeBranchingEngine::new(None);
        let arc = arc(ArcType::Character);
        let outcome = outcome("success");
        let branches = engine.generate_outcome_branches(&arc, &outcome, &[], &[]).await;

        let triggered = evaluate_branching_conditions(&arc, &outcome, branches);

        assert_eq!(
            titles(&triggered),
            [
                "Aftermath of The Drowned Bell",
                "Personal Growth",
                "The New Order",
                "Personal Growth",
                "Personal Growth"
            ]
        );
        // immediate (+5) with a triumphant tone (+2)
        assert_eq!(triggered[0].priority, 7);
        assert!((triggered[0].trigger_probability - 0.8).abs() < 1e-9);
        assert_eq!(triggered[1].branch.branch_category, BranchCategory::CharacterFocused);
        assert_eq!(triggered[1].priority, 4);
        assert!((triggered[1].trigger_probability - 0.6).abs() < 1e-9);
    }

    #[test]
    fn unmatched_triggers_are_dropped_unless_themes_overlap() {
        let arc = arc(ArcType::Regional);
        let branch = |trigger: &str, themes: Vec<String>| OutcomeBranch {
            title: trigger.to_string(),
            description: String::new(),
            trigger_conditions: trigger.to_string(),
            themes,
            estimated_complexity: BranchComplexity::High,
            key_npcs: Vec::new(),
            relationship_type: ArcRelationshipType::Sequel,
            emotional_tone: "tragedy".to_string(),
            narrative_hook: String::new(),
            branch_category: BranchCategory::ConflictResolution,
            generated_via: "llm",
        };
        let branches = BTreeMap::from([(
            BranchCategory::ConflictResolution,
            vec![
                branch("On failure", vec![]),
                branch("When the heir returns", vec!["Loss".into()]),
            ],
        )]);

        let triggered = evaluate_branching_conditions(&arc, &outcome("success"), branches);

        assert_eq!(titles(&triggered), ["When the heir returns"]);
        assert_eq!(triggered[0].priority, 2);
        assert!((triggered[0].trigger_probability - 0.4).abs() < 1e-9);
    }
}
