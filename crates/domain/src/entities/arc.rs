//! StoryArc aggregate - a multi-step narrative thread tracked to completion
//!
//! Arcs are scoped to the whole world, a region, a single player character or an NPC.
//! Status changes go through [`ArcStatus::can_transition_to`]; step counters keep
//! `current_step <= total_steps` and derive `completion_percentage` from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::ArcTypeConfig;
use crate::ArcId;

/// Narrative scope of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcType {
    Global,
    Regional,
    Character,
    Npc,
}

impl ArcType {
    pub const ALL: [ArcType; 4] = [
        ArcType::Global,
        ArcType::Regional,
        ArcType::Character,
        ArcType::Npc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArcType::Global => "global",
            ArcType::Regional => "regional",
            ArcType::Character => "character",
            ArcType::Npc => "npc",
        }
    }

    /// Static configuration for this arc type
    pub fn config(&self) -> ArcTypeConfig {
        ArcTypeConfig::for_type(*self)
    }
}

impl std::fmt::Display for ArcType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(ArcType::Global),
            "regional" => Ok(ArcType::Regional),
            "character" => Ok(ArcType::Character),
            "npc" => Ok(ArcType::Npc),
            _ => Err(DomainError::parse(format!("Invalid arc type: {}", s))),
        }
    }
}

/// Lifecycle status of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcStatus {
    Pending,
    Active,
    Stalled,
    Completed,
    Failed,
    Abandoned,
}

impl ArcStatus {
    pub const ALL: [ArcStatus; 6] = [
        ArcStatus::Pending,
        ArcStatus::Active,
        ArcStatus::Stalled,
        ArcStatus::Completed,
        ArcStatus::Failed,
        ArcStatus::Abandoned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArcStatus::Pending => "pending",
            ArcStatus::Active => "active",
            ArcStatus::Stalled => "stalled",
            ArcStatus::Completed => "completed",
            ArcStatus::Failed => "failed",
            ArcStatus::Abandoned => "abandoned",
        }
    }

    /// Check if the arc is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Abandoned)
    }

    /// Check if transition to target status is valid
    pub fn can_transition_to(&self, target: &ArcStatus) -> bool {
        use ArcStatus::*;
        matches!(
            (self, target),
            // From Pending
            (Pending, Active) | (Pending, Abandoned) |
            // From Active
            (Active, Stalled) | (Active, Completed) | (Active, Failed) | (Active, Abandoned) |
            // From Stalled
            (Stalled, Active) | (Stalled, Completed) | (Stalled, Failed) | (Stalled, Abandoned)
        )
    }
}

impl std::fmt::Display for ArcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ArcStatus::Pending),
            "active" => Ok(ArcStatus::Active),
            "stalled" => Ok(ArcStatus::Stalled),
            "completed" => Ok(ArcStatus::Completed),
            "failed" => Ok(ArcStatus::Failed),
            "abandoned" => Ok(ArcStatus::Abandoned),
            _ => Err(DomainError::parse(format!("Invalid arc status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcPriority {
    Low,
    Medium,
    High,
}

impl ArcPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArcPriority::Low => "low",
            ArcPriority::Medium => "medium",
            ArcPriority::High => "high",
        }
    }
}

impl std::fmt::Display for ArcPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcPriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(ArcPriority::Low),
            "medium" => Ok(ArcPriority::Medium),
            "high" => Ok(ArcPriority::High),
            _ => Err(DomainError::parse(format!("Invalid arc priority: {}", s))),
        }
    }
}

/// A multi-step narrative arc
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryArc {
    id: ArcId,
    title: String,
    description: String,
    arc_type: ArcType,
    status: ArcStatus,
    priority: ArcPriority,

    /// Situation the arc opens with
    starting_point: String,
    /// Ending the narrative is steered towards
    preferred_ending: String,

    current_step: u32,
    total_steps: u32,
    completion_percentage: f64,

    faction_ids: Vec<String>,
    /// Names of sibling systems this arc emits events to
    system_hooks: Vec<String>,
    /// 0.0 - 1.0, how strongly the deadline matters
    time_sensitivity: Option<f64>,
    deadline: Option<DateTime<Utc>>,
    stall_threshold_days: u32,

    /// 1 - 10
    difficulty_level: u8,
    estimated_duration_hours: Option<f64>,

    // Scope keys into sibling systems
    region_id: Option<String>,
    character_id: Option<String>,
    npc_id: Option<String>,

    classification_tags: BTreeMap<String, String>,
    /// Narrative themes, matched when suggesting links between arcs
    #[serde(default)]
    themes: Vec<String>,
    /// Arc this one was generated to follow
    predecessor_arc_id: Option<ArcId>,

    last_activity: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoryArc {
    pub const DEFAULT_DIFFICULTY: u8 = 5;

    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        arc_type: ArcType,
        now: DateTime<Utc>,
    ) -> Self {
        let config = arc_type.config();
        Self {
            id: ArcId::new(),
            title: title.into(),
            description: description.into(),
            arc_type,
            status: ArcStatus::Pending,
            priority: config.default_priority,
            starting_point: String::new(),
            preferred_ending: String::new(),
            current_step: 0,
            total_steps: 0,
            completion_percentage: 0.0,
            faction_ids: Vec::new(),
            system_hooks: Vec::new(),
            time_sensitivity: None,
            deadline: None,
            stall_threshold_days: config.stall_threshold_days,
            difficulty_level: Self::DEFAULT_DIFFICULTY,
            estimated_duration_hours: None,
            region_id: None,
            character_id: None,
            npc_id: None,
            classification_tags: BTreeMap::new(),
            themes: Vec::new(),
            predecessor_arc_id: None,
            last_activity: now,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    // Read accessors
    pub fn id(&self) -> ArcId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn arc_type(&self) -> ArcType {
        self.arc_type
    }

    pub fn status(&self) -> ArcStatus {
        self.status
    }

    pub fn priority(&self) -> ArcPriority {
        self.priority
    }

    pub fn starting_point(&self) -> &str {
        &self.starting_point
    }

    pub fn preferred_ending(&self) -> &str {
        &self.preferred_ending
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn completion_percentage(&self) -> f64 {
        self.completion_percentage
    }

    pub fn faction_ids(&self) -> &[String] {
        &self.faction_ids
    }

    pub fn system_hooks(&self) -> &[String] {
        &self.system_hooks
    }

    pub fn time_sensitivity(&self) -> Option<f64> {
        self.time_sensitivity
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn stall_threshold_days(&self) -> u32 {
        self.stall_threshold_days
    }

    pub fn difficulty_level(&self) -> u8 {
        self.difficulty_level
    }

    pub fn estimated_duration_hours(&self) -> Option<f64> {
        self.estimated_duration_hours
    }

    pub fn region_id(&self) -> Option<&str> {
        self.region_id.as_deref()
    }

    pub fn character_id(&self) -> Option<&str> {
        self.character_id.as_deref()
    }

    pub fn npc_id(&self) -> Option<&str> {
        self.npc_id.as_deref()
    }

    pub fn classification_tags(&self) -> &BTreeMap<String, String> {
        &self.classification_tags
    }

    pub fn themes(&self) -> &[String] {
        &self.themes
    }

    pub fn predecessor_arc_id(&self) -> Option<ArcId> {
        self.predecessor_arc_id
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
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
    pub fn with_priority(mut self, priority: ArcPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_starting_point(mut self, starting_point: impl Into<String>) -> Self {
        self.starting_point = starting_point.into();
        self
    }

    pub fn with_preferred_ending(mut self, preferred_ending: impl Into<String>) -> Self {
        self.preferred_ending = preferred_ending.into();
        self
    }

    pub fn with_total_steps(mut self, total_steps: u32) -> Self {
        self.total_steps = total_steps;
        self.current_step = self.current_step.min(total_steps);
        self.recompute_completion();
        self
    }

    pub fn with_faction_ids(mut self, faction_ids: Vec<String>) -> Self {
        self.faction_ids = faction_ids;
        self
    }

    pub fn with_system_hooks(mut self, system_hooks: Vec<String>) -> Self {
        self.system_hooks = system_hooks;
        self
    }

    pub fn with_time_sensitivity(mut self, time_sensitivity: f64) -> Self {
        self.time_sensitivity = Some(time_sensitivity);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_stall_threshold_days(mut self, days: u32) -> Self {
        self.stall_threshold_days = days;
        self
    }

    pub fn with_difficulty_level(mut self, difficulty_level: u8) -> Self {
        self.difficulty_level = difficulty_level;
        self
    }

    pub fn with_estimated_duration_hours(mut self, hours: f64) -> Self {
        self.estimated_duration_hours = Some(hours);
        self
    }

    pub fn with_region_id(mut self, region_id: impl Into<String>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    pub fn with_character_id(mut self, character_id: impl Into<String>) -> Self {
        self.character_id = Some(character_id.into());
        self
    }

    pub fn with_npc_id(mut self, npc_id: impl Into<String>) -> Self {
        self.npc_id = Some(npc_id.into());
        self
    }

    pub fn with_classification_tag(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.classification_tags.insert(key.into(), value.into());
        self
    }

    pub fn with_themes(mut self, themes: Vec<String>) -> Self {
        self.themes = themes;
        self
    }

    pub fn with_predecessor(mut self, arc_id: ArcId) -> Self {
        self.predecessor_arc_id = Some(arc_id);
        self
    }

    /// Check hard invariants. Softer narrative rules live in `business_rules`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("Arc title cannot be empty"));
        }
        if let Some(ts) = self.time_sensitivity {
            if !(0.0..=1.0).contains(&ts) {
                return Err(DomainError::validation(format!(
                    "time_sensitivity must be between 0.0 and 1.0, got {}",
                    ts
                )));
            }
        }
        if !(1..=10).contains(&self.difficulty_level) {
            return Err(DomainError::validation(format!(
                "difficulty_level must be between 1 and 10, got {}",
                self.difficulty_level
            )));
        }
        if self.stall_threshold_days == 0 {
            return Err(DomainError::validation(
                "stall_threshold_days must be at least 1",
            ));
        }
        if self.current_step > self.total_steps {
            return Err(DomainError::constraint(format!(
                "current_step {} exceeds total_steps {}",
                self.current_step, self.total_steps
            )));
        }
        Ok(())
    }

    // Setter methods for updating existing arcs
    pub fn set_title(&mut self, title: impl Into<String>, now: DateTime<Utc>) {
        self.title = title.into();
        self.updated_at = now;
    }

    pub fn set_description(&mut self, description: impl Into<String>, now: DateTime<Utc>) {
        self.description = description.into();
        self.updated_at = now;
    }

    pub fn set_priority(&mut self, priority: ArcPriority, now: DateTime<Utc>) {
        self.priority = priority;
        self.updated_at = now;
    }

    pub fn set_starting_point(&mut self, starting_point: impl Into<String>, now: DateTime<Utc>) {
        self.starting_point = starting_point.into();
        self.updated_at = now;
    }

    pub fn set_preferred_ending(&mut self, preferred_ending: impl Into<String>, now: DateTime<Utc>) {
        self.preferred_ending = preferred_ending.into();
        self.updated_at = now;
    }

    pub fn set_faction_ids(&mut self, faction_ids: Vec<String>, now: DateTime<Utc>) {
        self.faction_ids = faction_ids;
        self.updated_at = now;
    }

    pub fn set_themes(&mut self, themes: Vec<String>, now: DateTime<Utc>) {
        self.themes = themes;
        self.updated_at = now;
    }

    pub fn set_system_hooks(&mut self, system_hooks: Vec<String>, now: DateTime<Utc>) {
        self.system_hooks = system_hooks;
        self.updated_at = now;
    }

    pub fn set_time_sensitivity(&mut self, time_sensitivity: Option<f64>, now: DateTime<Utc>) {
        self.time_sensitivity = time_sensitivity;
        self.updated_at = now;
    }

    pub fn set_deadline(&mut self, deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.deadline = deadline;
        self.updated_at = now;
    }

    pub fn set_stall_threshold_days(&mut self, days: u32, now: DateTime<Utc>) {
        self.stall_threshold_days = days;
        self.updated_at = now;
    }

    pub fn set_difficulty_level(&mut self, difficulty_level: u8, now: DateTime<Utc>) {
        self.difficulty_level = difficulty_level;
        self.updated_at = now;
    }

    pub fn set_estimated_duration_hours(&mut self, hours: Option<f64>, now: DateTime<Utc>) {
        self.estimated_duration_hours = hours;
        self.updated_at = now;
    }

    /// Change the step count, clamping the cursor so it never runs past the end.
    pub fn set_total_steps(&mut self, total_steps: u32, now: DateTime<Utc>) {
        self.total_steps = total_steps;
        self.current_step = self.current_step.min(total_steps);
        self.recompute_completion();
        self.updated_at = now;
    }

    // State transitions
    fn transition(&mut self, target: ArcStatus, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.status.can_transition_to(&target) {
            return Err(DomainError::invalid_state_transition(format!(
                "Arc {} cannot move from {} to {}",
                self.id, self.status, target
            )));
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING -> ACTIVE. Any other source status is rejected.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != ArcStatus::Pending {
            return Err(DomainError::invalid_state_transition(
                "Arc not in pending status",
            ));
        }
        self.transition(ArcStatus::Active, now)?;
        self.started_at = Some(now);
        self.last_activity = now;
        Ok(())
    }

    /// Move the step cursor forward by one.
    ///
    /// The cursor is capped at `total_steps`. A stalled arc becomes active again.
    pub fn advance_step(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state_transition(format!(
                "Arc {} is {} and cannot be advanced",
                self.id, self.status
            )));
        }
        if self.status == ArcStatus::Stalled {
            self.transition(ArcStatus::Active, now)?;
        }
        self.current_step = self.current_step.saturating_add(1).min(self.total_steps);
        self.recompute_completion();
        self.last_activity = now;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_stalled(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStatus::Stalled, now)
    }

    /// Terminal completion. Always lands in COMPLETED; the outcome lives on the
    /// completion record.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStatus::Completed, now)?;
        self.completion_percentage = 100.0;
        self.completed_at = Some(now);
        self.last_activity = now;
        Ok(())
    }

    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStatus::Failed, now)?;
        self.completed_at = Some(now);
        self.last_activity = now;
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(ArcStatus::Abandoned, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Record activity without moving the cursor (e.g. a failed step attempt).
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        self.updated_at = now;
    }

    // Queries
    pub fn days_since_activity(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_activity).num_days()
    }

    /// ACTIVE and idle for longer than the stall threshold.
    pub fn is_stalled_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ArcStatus::Active
            && now.signed_duration_since(self.last_activity)
                > Duration::days(i64::from(self.stall_threshold_days))
    }

    /// ACTIVE, time-sensitive and past its deadline.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ArcStatus::Active
            && self.time_sensitivity.is_some_and(|ts| ts > 0.0)
            && self.deadline.is_some_and(|deadline| deadline < now)
    }

    pub fn is_complete(&self) -> bool {
        self.total_steps > 0 && self.current_step >= self.total_steps
    }

    fn recompute_completion(&mut self) {
        self.completion_percentage = if self.total_steps > 0 {
            f64::from(self.current_step) / f64::from(self.total_steps) * 100.0
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn character_arc(total_steps: u32) -> StoryArc {
        StoryArc::new(
            "The Lost Heir",
            "A claimant to the throne hides among the dock workers",
            ArcType::Character,
            fixed_time(),
        )
        .with_total_steps(total_steps)
        .with_character_id("pc-1")
    }

    #[test]
    fn new_arc_is_pending_with_type_defaults() {
        let arc = character_arc(3);
        assert_eq!(arc.status(), ArcStatus::Pending);
        assert_eq!(arc.priority(), ArcPriority::Medium);
        assert_eq!(arc.stall_threshold_days(), 7);
        assert_eq!(arc.completion_percentage(), 0.0);

        let global = StoryArc::new("The Sundering", "", ArcType::Global, fixed_time());
        assert_eq!(global.stall_threshold_days(), 21);
        assert_eq!(global.priority(), ArcPriority::High);
    }

    #[test]
    fn test_arc_status_transitions() {
        use ArcStatus::*;

        assert!(Pending.can_transition_to(&Active));
        assert!(Pending.can_transition_to(&Abandoned));
        assert!(!Pending.can_transition_to(&Completed));

        assert!(Active.can_transition_to(&Stalled));
        assert!(Active.can_transition_to(&Completed));
        assert!(!Active.can_transition_to(&Pending));

        assert!(Stalled.can_transition_to(&Active));
        assert!(Stalled.can_transition_to(&Completed));

        // Terminal states cannot transition
        assert!(!Completed.can_transition_to(&Active));
        assert!(!Failed.can_transition_to(&Pending));
        assert!(!Abandoned.can_transition_to(&Active));
    }

    #[test]
    fn activate_only_from_pending() {
        let mut arc = character_arc(3);
        assert!(arc.activate(fixed_time()).is_ok());
        assert_eq!(arc.status(), ArcStatus::Active);
        assert_eq!(arc.started_at(), Some(fixed_time()));

        let err = arc.activate(fixed_time()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition(_)));
    }

    #[test]
    fn advance_keeps_cursor_and_percentage_consistent() {
        let mut arc = character_arc(3);
        arc.activate(fixed_time()).unwrap();

        for expected in 1..=5u32 {
            arc.advance_step(fixed_time()).unwrap();
            let current = expected.min(3);
            assert_eq!(arc.current_step(), current);
            assert!(arc.current_step() <= arc.total_steps());
            let pct = f64::from(current) / 3.0 * 100.0;
            assert!((arc.completion_percentage() - pct).abs() < 1e-9);
        }
    }

    #[test]
    fn advance_with_zero_steps_keeps_zero_percentage() {
        let mut arc = character_arc(0);
        arc.activate(fixed_time()).unwrap();
        arc.advance_step(fixed_time()).unwrap();
        assert_eq!(arc.current_step(), 0);
        assert_eq!(arc.completion_percentage(), 0.0);
    }

    #[test]
    fn advancing_a_stalled_arc_reactivates_it() {
        let mut arc = character_arc(3);
        arc.activate(fixed_time()).unwrap();
        arc.mark_stalled(fixed_time()).unwrap();

        arc.advance_step(fixed_time() + Duration::days(1)).unwrap();
        assert_eq!(arc.status(), ArcStatus::Active);
        assert_eq!(arc.last_activity(), fixed_time() + Duration::days(1));
    }

    #[test]
    fn completed_arc_cannot_advance() {
        let mut arc = character_arc(3);
        arc.activate(fixed_time()).unwrap();
        arc.complete(fixed_time()).unwrap();

        assert_eq!(arc.completion_percentage(), 100.0);
        assert!(arc.advance_step(fixed_time()).is_err());
    }

    #[test]
    fn stall_detection_uses_threshold() {
        let mut arc = character_arc(3);
        arc.activate(fixed_time()).unwrap();

        assert!(arc.is_stalled_at(fixed_time() + Duration::days(10)));
        assert!(!arc.is_stalled_at(fixed_time() + Duration::days(2)));
    }

    #[test]
    fn overdue_requires_time_sensitivity_and_past_deadline() {
        let deadline = fixed_time() + Duration::days(3);
        let mut arc = character_arc(3).with_deadline(deadline);
        arc.activate(fixed_time()).unwrap();
        assert!(!arc.is_overdue_at(fixed_time() + Duration::days(5)));

        let mut sensitive = character_arc(3)
            .with_deadline(deadline)
            .with_time_sensitivity(0.8);
        sensitive.activate(fixed_time()).unwrap();
        assert!(sensitive.is_overdue_at(fixed_time() + Duration::days(5)));
        assert!(!sensitive.is_overdue_at(fixed_time() + Duration::days(1)));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        assert!(character_arc(3).validate().is_ok());
        assert!(character_arc(3).with_time_sensitivity(1.5).validate().is_err());
        assert!(character_arc(3).with_difficulty_level(0).validate().is_err());
        assert!(StoryArc::new("  ", "", ArcType::Npc, fixed_time())
            .validate()
            .is_err());
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for arc_type in ArcType::ALL {
            assert_eq!(arc_type.as_str().parse::<ArcType>().unwrap(), arc_type);
        }
        for status in ArcStatus::ALL {
            assert_eq!(status.to_string().parse::<ArcStatus>().unwrap(), status);
        }
        assert!("cosmic".parse::<ArcType>().is_err());
        assert_eq!(
            serde_json::to_string(&ArcType::Npc).unwrap(),
            "\"npc\""
        );
    }
}
