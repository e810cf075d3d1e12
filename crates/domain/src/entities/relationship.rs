//! ArcRelationship - a directed narrative link between two arcs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{ArcId, RelationshipId};

use super::arc::{ArcStatus, ArcType, StoryArc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcRelationshipType {
    /// Target picks up where the source left off
    Sequel,
    /// Target happened before the source
    Prequel,
    /// Both run side by side
    Parallel,
    /// Target is one of several paths out of the source's outcome
    Branching,
    Continuation,
    ThematicLink,
    /// Target is a result of the source
    Consequence,
}

impl ArcRelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequel => "sequel",
            Self::Prequel => "prequel",
            Self::Parallel => "parallel",
            Self::Branching => "branching",
            Self::Continuation => "continuation",
            Self::ThematicLink => "thematic_link",
            Self::Consequence => "consequence",
        }
    }

    /// The `(predecessor, successor)` ordering this link implies, if any.
    ///
    /// Sequels and continuations run source then target; a prequel runs the
    /// other way. Every other kind is an undirected association.
    pub fn ordering(&self, source: ArcId, target: ArcId) -> Option<(ArcId, ArcId)> {
        match self {
            Self::Sequel | Self::Continuation => Some((source, target)),
            Self::Prequel => Some((target, source)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArcRelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcRelationshipType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequel" => Ok(Self::Sequel),
            "prequel" => Ok(Self::Prequel),
            "parallel" => Ok(Self::Parallel),
            "branching" => Ok(Self::Branching),
            "continuation" => Ok(Self::Continuation),
            "thematic_link" => Ok(Self::ThematicLink),
            "consequence" => Ok(Self::Consequence),
            _ => Err(DomainError::parse(format!(
                "Invalid relationship type: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcInfluenceLevel {
    Minimal,
    #[default]
    Moderate,
    Major,
    Critical,
}

impl ArcInfluenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Moderate => "moderate",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ArcInfluenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcInfluenceLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "moderate" => Ok(Self::Moderate),
            "major" => Ok(Self::Major),
            "critical" => Ok(Self::Critical),
            _ => Err(DomainError::parse(format!("Invalid influence level: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcRelationship {
    id: RelationshipId,
    source_arc_id: ArcId,
    target_arc_id: ArcId,
    relationship_type: ArcRelationshipType,
    influence_level: ArcInfluenceLevel,
    /// Free-form details of how the source shapes the target
    #[serde(default)]
    influence_data: BTreeMap<String, String>,
    #[serde(default)]
    narrative_connection: Option<String>,
    created_at: DateTime<Utc>,
}

impl ArcRelationship {
    pub fn new(
        source_arc_id: ArcId,
        target_arc_id: ArcId,
        relationship_type: ArcRelationshipType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RelationshipId::new(),
            source_arc_id,
            target_arc_id,
            relationship_type,
            influence_level: ArcInfluenceLevel::default(),
            influence_data: BTreeMap::new(),
            narrative_connection: None,
            created_at: now,
        }
    }

    pub fn with_influence_level(mut self, level: ArcInfluenceLevel) -> Self {
        self.influence_level = level;
        self
    }

    pub fn with_influence_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.influence_data = data;
        self
    }

    pub fn with_narrative_connection(mut self, connection: impl Into<String>) -> Self {
        let connection = connection.into();
        self.narrative_connection = (!connection.trim().is_empty()).then_some(connection);
        self
    }

    pub fn id(&self) -> RelationshipId {
        self.id
    }

    pub fn source_arc_id(&self) -> ArcId {
        self.source_arc_id
    }

    pub fn target_arc_id(&self) -> ArcId {
        self.target_arc_id
    }

    pub fn relationship_type(&self) -> ArcRelationshipType {
        self.relationship_type
    }

    pub fn influence_level(&self) -> ArcInfluenceLevel {
        self.influence_level
    }

    pub fn influence_data(&self) -> &BTreeMap<String, String> {
        &self.influence_data
    }

    pub fn narrative_connection(&self) -> Option<&str> {
        self.narrative_connection.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn involves(&self, arc_id: ArcId) -> bool {
        self.source_arc_id == arc_id || self.target_arc_id == arc_id
    }

    /// Same endpoints, in either direction, with the same type.
    pub fn duplicates(&self, source: ArcId, target: ArcId, kind: ArcRelationshipType) -> bool {
        self.relationship_type == kind
            && ((self.source_arc_id == source && self.target_arc_id == target)
                || (self.source_arc_id == target && self.target_arc_id == source))
    }
}

/// Reasons a `kind` link from `source` to `target` does not make narrative sense.
/// Empty when the link is acceptable.
pub fn relationship_violations(
    source: &StoryArc,
    target: &StoryArc,
    kind: ArcRelationshipType,
) -> Vec<String> {
    let mut errors = Vec::new();

    if source.id() == target.id() {
        errors.push("Arc cannot have relationship with itself".to_string());
    }

    match kind {
        ArcRelationshipType::Sequel => {
            if !matches!(source.status(), ArcStatus::Completed | ArcStatus::Active) {
                errors.push(
                    "Sequel relationships require source arc to be completed or active".to_string(),
                );
            }
        }
        ArcRelationshipType::Prequel => {
            if target.status() == ArcStatus::Completed {
                errors.push("Cannot create prequel to completed arc".to_string());
            }
        }
        ArcRelationshipType::Parallel => {
            if source.status() == ArcStatus::Completed && target.status() == ArcStatus::Completed {
                errors.push("Parallel relationships require at least one active arc".to_string());
            }
        }
        ArcRelationshipType::Branching => {
            if source.status() != ArcStatus::Completed {
                errors.push(
                    "Branching relationships require the source arc to have an outcome".to_string(),
                );
            }
        }
        _ => {}
    }

    if source.arc_type() == ArcType::Character && target.arc_type() == ArcType::Global {
        errors.push("Character arcs should not directly influence global arcs".to_string());
    }

    if let (Some(started), Some(ended)) = (source.started_at(), target.completed_at()) {
        if started > ended {
            errors.push("Source arc cannot start after target arc ends".to_string());
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn arc(arc_type: ArcType) -> StoryArc {
        StoryArc::new("The Salt Road", "Smugglers move inland", arc_type, t0())
            .with_total_steps(3)
    }

    fn completed(arc_type: ArcType, at: DateTime<Utc>) -> StoryArc {
        let mut arc = arc(arc_type);
        arc.activate(t0()).unwrap();
        arc.complete(at).unwrap();
        arc
    }

    #[test]
    fn self_links_are_rejected() {
        let a = arc(ArcType::Regional);
        let errors = relationship_violations(&a, &a, ArcRelationshipType::ThematicLink);
        assert_eq!(errors, vec!["Arc cannot have relationship with itself"]);
    }

    #[test]
    fn sequel_needs_a_started_source() {
        let pending = arc(ArcType::Regional);
        let other = arc(ArcType::Regional);
        let errors = relationship_violations(&pending, &other, ArcRelationshipType::Sequel);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Sequel"));

        let done = completed(ArcType::Regional, t0() + Duration::days(2));
        assert!(relationship_violations(&done, &other, ArcRelationshipType::Sequel).is_empty());
    }

    #[test]
    fn prequel_parallel_and_branching_rules() {
        let done_a = completed(ArcType::Regional, t0() + Duration::days(2));
        let done_b = completed(ArcType::Regional, t0() + Duration::days(3));
        let open = arc(ArcType::Regional);

        assert!(!relationship_violations(&open, &done_a, ArcRelationshipType::Prequel).is_empty());
        assert!(!relationship_violations(&done_a, &done_b, ArcRelationshipType::Parallel).is_empty());
        assert!(relationship_violations(&done_a, &open, ArcRelationshipType::Parallel).is_empty());
        assert!(!relationship_violations(&open, &done_a, ArcRelationshipType::Branching).is_empty());
        assert!(relationship_violations(&done_a, &open, ArcRelationshipType::Branching).is_empty());
    }

    #[test]
    fn character_arcs_do_not_reach_global_scope() {
        let personal = arc(ArcType::Character);
        let world = arc(ArcType::Global);
        let errors = relationship_violations(&personal, &world, ArcRelationshipType::Consequence);
        assert_eq!(
            errors,
            vec!["Character arcs should not directly influence global arcs"]
        );
        assert!(relationship_violations(&world, &personal, ArcRelationshipType::Consequence)
            .is_empty());
    }

    #[test]
    fn source_starting_after_target_ended_is_rejected() {
        let target = completed(ArcType::Regional, t0() + Duration::hours(1));
        let mut source = arc(ArcType::Regional);
        source.activate(t0() + Duration::days(5)).unwrap();

        let errors = relationship_violations(&source, &target, ArcRelationshipType::Consequence);
        assert_eq!(errors, vec!["Source arc cannot start after target arc ends"]);
    }

    #[test]
    fn ordering_follows_the_link_direction() {
        let a = ArcId::new();
        let b = ArcId::new();
        assert_eq!(ArcRelationshipType::Sequel.ordering(a, b), Some((a, b)));
        assert_eq!(ArcRelationshipType::Prequel.ordering(a, b), Some((b, a)));
        assert_eq!(ArcRelationshipType::Parallel.ordering(a, b), None);
    }

    #[test]
    fn duplicates_match_either_direction() {
        let a = ArcId::new();
        let b = ArcId::new();
        let link = ArcRelationship::new(a, b, ArcRelationshipType::Parallel, t0());
        assert!(link.duplicates(b, a, ArcRelationshipType::Parallel));
        assert!(!link.duplicates(a, b, ArcRelationshipType::Sequel));
    }

    #[test]
    fn blank_narrative_connection_is_dropped() {
        let link =
            ArcRelationship::new(ArcId::new(), ArcId::new(), ArcRelationshipType::Sequel, t0())
                .with_narrative_connection("  ");
        assert_eq!(link.narrative_connection(), None);
        assert_eq!(link.influence_level(), ArcInfluenceLevel::Moderate);
        assert_eq!(
            "thematic_link".parse::<ArcRelationshipType>(),
            Ok(ArcRelationshipType::ThematicLink)
        );
    }
}
