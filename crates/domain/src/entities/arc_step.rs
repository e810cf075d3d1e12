//! ArcStep entity - one discrete beat within an arc

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::QuestContext;
use crate::{ArcId, ArcStepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcStepStatus {
    Pending,
    Available,
    Active,
    Completed,
    Failed,
    Skipped,
}

impl ArcStepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArcStepStatus::Pending => "pending",
            ArcStepStatus::Available => "available",
            ArcStepStatus::Active => "active",
            ArcStepStatus::Completed => "completed",
            ArcStepStatus::Failed => "failed",
            ArcStepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Steps that can still seed quests
    pub fn is_open_for_quests(&self) -> bool {
        matches!(self, Self::Pending | Self::Available)
    }

    pub fn can_transition_to(&self, target: &ArcStepStatus) -> bool {
        use ArcStepStatus::*;
        matches!(
            (self, target),
            (Pending, Available) | (Pending, Active) | (Pending, Completed) | (Pending, Failed) | (Pending, Skipped) |
            (Available, Active) | (Available, Completed) | (Available, Failed) | (Available, Skipped) |
            (Active, Completed) | (Active, Failed) |
            // Failed steps may be retried
            (Failed, Available) | (Failed, Active) | (Failed, Completed)
        )
    }
}

impl std::fmt::Display for ArcStepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcStepStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "available" => Ok(Self::Available),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(DomainError::parse(format!("Invalid step status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcStepType {
    Discovery,
    Challenge,
    Decision,
    Interaction,
    #[default]
    Narrative,
    Exploration,
}

impl ArcStepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArcStepType::Discovery => "discovery",
            ArcStepType::Challenge => "challenge",
            ArcStepType::Decision => "decision",
            ArcStepType::Interaction => "interaction",
            ArcStepType::Narrative => "narrative",
            ArcStepType::Exploration => "exploration",
        }
    }
}

impl std::fmt::Display for ArcStepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcStepType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discovery" => Ok(Self::Discovery),
            "challenge" => Ok(Self::Challenge),
            "decision" => Ok(Self::Decision),
            "interaction" => Ok(Self::Interaction),
            "narrative" => Ok(Self::Narrative),
            "exploration" => Ok(Self::Exploration),
            _ => Err(DomainError::parse(format!("Invalid step type: {}", s))),
        }
    }
}

/// How a step is judged complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaKind {
    #[default]
    Manual,
    Automatic,
    ConditionBased,
    TimeBased,
    EventTriggered,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompletionCriteria {
    #[serde(default)]
    pub kind: CriteriaKind,
    #[serde(default)]
    pub description: String,
    /// Free-form conditions, used by `condition_based`
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Used by `time_based`
    #[serde(default)]
    pub required_hours: Option<f64>,
    /// Used by `event_triggered`
    #[serde(default)]
    pub trigger_event: Option<String>,
}

impl CompletionCriteria {
    pub fn manual(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

/// Key/value tag used for quest-context matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcStepTag {
    pub key: String,
    pub value: String,
    #[serde(default = "default_tag_weight")]
    pub weight: f64,
    #[serde(default)]
    pub required: bool,
}

fn default_tag_weight() -> f64 {
    1.0
}

impl ArcStepTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            weight: default_tag_weight(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Plain equality / list containment against the context.
    pub fn matches(&self, context: &QuestContext) -> bool {
        context
            .get(&self.key)
            .is_some_and(|value| value.matches(&self.value))
    }
}

/// A step belonging to exactly one arc
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcStep {
    id: ArcStepId,
    arc_id: ArcId,
    /// Unique within the arc, contiguous from 0
    step_index: u32,
    title: String,
    description: String,
    narrative_text: String,
    step_type: ArcStepType,
    status: ArcStepStatus,
    completion_criteria: CompletionCriteria,
    /// 0.0 - 1.0
    quest_probability: f64,
    tags: Vec<ArcStepTag>,
    attempts: u32,
    estimated_duration_hours: Option<f64>,
    failure_reason: Option<String>,
    first_attempted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ArcStep {
    pub const DEFAULT_QUEST_PROBABILITY: f64 = 0.3;

    /// Criteria default to a manual check described by the title.
    pub fn new(arc_id: ArcId, step_index: u32, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        let title = title.into();
        Self {
            id: ArcStepId::new(),
            arc_id,
            step_index,
            completion_criteria: CompletionCriteria::manual(&title),
            title,
            description: String::new(),
            narrative_text: String::new(),
            step_type: ArcStepType::default(),
            status: ArcStepStatus::Pending,
            quest_probability: Self::DEFAULT_QUEST_PROBABILITY,
            tags: Vec::new(),
            attempts: 0,
            estimated_duration_hours: None,
            failure_reason: None,
            first_attempted_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> ArcStepId {
        self.id
    }

    pub fn arc_id(&self) -> ArcId {
        self.arc_id
    }

    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn narrative_text(&self) -> &str {
        &self.narrative_text
    }

    pub fn step_type(&self) -> ArcStepType {
        self.step_type
    }

    pub fn status(&self) -> ArcStepStatus {
        self.status
    }

    pub fn completion_criteria(&self) -> &CompletionCriteria {
        &self.completion_criteria
    }

    pub fn quest_probability(&self) -> f64 {
        self.quest_probability
    }

    pub fn tags(&self) -> &[ArcStepTag] {
        &self.tags
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn estimated_duration_hours(&self) -> Option<f64> {
        self.estimated_duration_hours
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn first_attempted_at(&self) -> Option<DateTime<Utc>> {
        self.first_attempted_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Builder methods
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_narrative_text(mut self, narrative_text: impl Into<String>) -> Self {
        self.narrative_text = narrative_text.into();
        self
    }

    pub fn with_step_type(mut self, step_type: ArcStepType) -> Self {
        self.step_type = step_type;
        self
    }

    pub fn with_completion_criteria(mut self, criteria: CompletionCriteria) -> Self {
        self.completion_criteria = criteria;
        self
    }

    /// Clamped into 0.0 - 1.0
    pub fn with_quest_probability(mut self, probability: f64) -> Self {
        self.quest_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_tags(mut self, tags: Vec<ArcStepTag>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag(mut self, tag: ArcStepTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn with_estimated_duration_hours(mut self, hours: f64) -> Self {
        self.estimated_duration_hours = Some(hours);
        self
    }

    /// Re-home a step under a new index (used when appending to an arc).
    pub fn reindexed(mut self, arc_id: ArcId, step_index: u32) -> Self {
        self.arc_id = arc_id;
        self.step_index = step_index;
        self
    }

    // Lifecycle
    fn transition(&mut self, target: ArcStepStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(&target) {
            return Err(DomainError::invalid_state_transition(format!(
                "Step {} cannot move from {} to {}",
                self.step_index, self.status, target
            )));
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn make_available(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStepStatus::Available, now)
    }

    /// Begin an attempt at this step.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStepStatus::Active, now)?;
        self.record_attempt(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStepStatus::Completed, now)?;
        if self.first_attempted_at.is_none() {
            self.record_attempt(now);
        }
        self.completed_at = Some(now);
        self.failure_reason = None;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStepStatus::Failed, now)?;
        self.record_attempt(now);
        let reason = reason.into();
        self.failure_reason = (!reason.is_empty()).then_some(reason);
        Ok(())
    }

    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStepStatus::Skipped, now)
    }

    fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        if self.first_attempted_at.is_none() {
            self.first_attempted_at = Some(now);
        }
    }

    /// Fraction of tag weight satisfied by the context, 0.0 - 1.0.
    ///
    /// Unlike the quest-integration score this applies no category boosts and
    /// no required-tag gate.
    pub fn calculate_tag_match_score(&self, context: &QuestContext) -> f64 {
        let total: f64 = self.tags.iter().map(|t| t.weight).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let matched: f64 = self
            .tags
            .iter()
            .filter(|t| t.matches(context))
            .map(|t| t.weight)
            .sum();
        matched / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn step() -> ArcStep {
        ArcStep::new(ArcId::new(), 0, "Find the smuggler", fixed_time())
    }

    #[test]
    fn tag_match_score_is_weighted_fraction() {
        let step = step().with_tags(vec![
            ArcStepTag::new("location", "docks"),
            ArcStepTag::new("npc", "smuggler"),
            ArcStepTag::new("faction", "guild"),
        ]);
        let ctx = QuestContext::new()
            .with("location", "docks")
            .with("npc", "smuggler");

        let score = step.calculate_tag_match_score(&ctx);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn tag_match_score_respects_weights() {
        let step = step().with_tags(vec![
            ArcStepTag::new("location", "docks").with_weight(0.9),
            ArcStepTag::new("skill", "stealth").with_weight(0.9),
        ]);
        let ctx = QuestContext::new().with("skill", "stealth");
        assert!((step.calculate_tag_match_score(&ctx) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn tag_match_score_without_tags_is_zero() {
        let ctx = QuestContext::new().with("location", "docks");
        assert_eq!(step().calculate_tag_match_score(&ctx), 0.0);
    }

    #[test]
    fn new_step_has_usable_default_criteria() {
        let step = step();
        assert_eq!(step.completion_criteria().kind, CriteriaKind::Manual);
        assert_eq!(step.completion_criteria().description, "Find the smuggler");
    }

    #[test]
    fn quest_probability_is_clamped() {
        assert_eq!(step().with_quest_probability(1.7).quest_probability(), 1.0);
        assert_eq!(step().with_quest_probability(-0.2).quest_probability(), 0.0);
    }

    #[test]
    fn complete_sets_timestamps() {
        let mut step = step();
        step.complete(fixed_time()).unwrap();

        assert_eq!(step.status(), ArcStepStatus::Completed);
        assert_eq!(step.completed_at(), Some(fixed_time()));
        assert_eq!(step.first_attempted_at(), Some(fixed_time()));
        assert_eq!(step.attempts(), 1);
    }

    #[test]
    fn failed_step_can_be_retried() {
        let mut step = step();
        step.fail("ambushed", fixed_time()).unwrap();
        assert_eq!(step.failure_reason(), Some("ambushed"));
        assert_eq!(step.attempts(), 1);

        step.start(fixed_time()).unwrap();
        assert_eq!(step.attempts(), 2);
        step.complete(fixed_time()).unwrap();
        assert_eq!(step.failure_reason(), None);
    }

    #[test]
    fn completed_step_cannot_fail() {
        let mut step = step();
        step.complete(fixed_time()).unwrap();
        assert!(step.fail("late", fixed_time()).is_err());
    }

    #[test]
    fn tag_defaults_when_deserialized() {
        let tag: ArcStepTag =
            serde_json::from_str(r#"{"key": "location", "value": "tavern"}"#).unwrap();
        assert_eq!(tag.weight, 1.0);
        assert!(!tag.required);
    }
}
