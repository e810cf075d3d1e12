//! ArcProgression - the mutable tracking record of an arc's steps

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{ArcId, ProgressionId};

use super::completion::ArcCompletionResult;

/// How a step was advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionMethod {
    #[default]
    QuestCompletion,
    TimePassage,
    NpcAction,
    WorldEvent,
    SystemTrigger,
    TimeTrigger,
}

impl ProgressionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressionMethod::QuestCompletion => "quest_completion",
            ProgressionMethod::TimePassage => "time_passage",
            ProgressionMethod::NpcAction => "npc_action",
            ProgressionMethod::WorldEvent => "world_event",
            ProgressionMethod::SystemTrigger => "system_trigger",
            ProgressionMethod::TimeTrigger => "time_trigger",
        }
    }
}

impl std::fmt::Display for ProgressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProgressionMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quest_completion" => Ok(Self::QuestCompletion),
            "time_passage" => Ok(Self::TimePassage),
            "npc_action" => Ok(Self::NpcAction),
            "world_event" => Ok(Self::WorldEvent),
            "system_trigger" => Ok(Self::SystemTrigger),
            "time_trigger" => Ok(Self::TimeTrigger),
            _ => Err(DomainError::parse(format!(
                "Invalid progression method: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionEventType {
    ArcActivated,
    StepCompleted,
    StepFailed,
    StepSkipped,
    ArcStalled,
    ArcCompleted,
    ArcFailed,
    ArcAbandoned,
}

/// One entry in the append-only progression log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: ProgressionEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ProgressionMethod>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ProgressionEvent {
    fn new(event_type: ProgressionEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            event_type,
            step_index: None,
            method: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Progression record, one per arc.
///
/// `current_step_index` never decreases. Completed and failed sets stay disjoint:
/// completing a step clears an earlier failure, and a completed step cannot fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcProgression {
    id: ProgressionId,
    arc_id: ArcId,
    current_step_index: u32,
    completed_steps: BTreeSet<u32>,
    failed_steps: BTreeSet<u32>,
    progression_events: Vec<ProgressionEvent>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl ArcProgression {
    pub fn new(arc_id: ArcId, now: DateTime<Utc>) -> Self {
        Self {
            id: ProgressionId::new(),
            arc_id,
            current_step_index: 0,
            completed_steps: BTreeSet::new(),
            failed_steps: BTreeSet::new(),
            progression_events: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn id(&self) -> ProgressionId {
        self.id
    }

    pub fn arc_id(&self) -> ArcId {
        self.arc_id
    }

    pub fn current_step_index(&self) -> u32 {
        self.current_step_index
    }

    pub fn completed_steps(&self) -> &BTreeSet<u32> {
        &self.completed_steps
    }

    pub fn failed_steps(&self) -> &BTreeSet<u32> {
        &self.failed_steps
    }

    pub fn progression_events(&self) -> &[ProgressionEvent] {
        &self.progression_events
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Completed steps as a percentage of `total_steps`.
    pub fn completion_percentage(&self, total_steps: u32) -> f64 {
        if total_steps == 0 {
            return 0.0;
        }
        self.completed_steps.len() as f64 / f64::from(total_steps) * 100.0
    }

    pub fn record_activation(&mut self, now: DateTime<Utc>) {
        self.push(ProgressionEvent::new(ProgressionEventType::ArcActivated, now));
    }

    /// Set insert, so completing the same index twice leaves a single entry.
    pub fn record_step_completion(
        &mut self,
        step_index: u32,
        method: ProgressionMethod,
        now: DateTime<Utc>,
    ) {
        self.completed_steps.insert(step_index);
        self.failed_steps.remove(&step_index);
        self.current_step_index = self.current_step_index.max(step_index.saturating_add(1));

        let mut event = ProgressionEvent::new(ProgressionEventType::StepCompleted, now);
        event.step_index = Some(step_index);
        event.method = Some(method);
        self.push(event);
    }

    pub fn record_step_failure(
        &mut self,
        step_index: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.completed_steps.contains(&step_index) {
            return Err(DomainError::invalid_state_transition(format!(
                "Step {} is already completed",
                step_index
            )));
        }
        self.failed_steps.insert(step_index);

        let mut event = ProgressionEvent::new(ProgressionEventType::StepFailed, now);
        event.step_index = Some(step_index);
        if !reason.is_empty() {
            event.metadata.insert("reason".to_string(), reason.to_string());
        }
        self.push(event);
        Ok(())
    }

    /// A skipped step is neither completed nor failed and leaves the cursor alone.
    pub fn record_step_skip(&mut self, step_index: u32, now: DateTime<Utc>) {
        self.failed_steps.remove(&step_index);

        let mut event = ProgressionEvent::new(ProgressionEventType::StepSkipped, now);
        event.step_index = Some(step_index);
        self.push(event);
    }

    pub fn record_stall(&mut self, days_inactive: i64, now: DateTime<Utc>) {
        let mut event = ProgressionEvent::new(ProgressionEventType::ArcStalled, now);
        event
            .metadata
            .insert("days_inactive".to_string(), days_inactive.to_string());
        self.push(event);
    }

    pub fn record_completion(&mut self, result: ArcCompletionResult, now: DateTime<Utc>) {
        let mut event = ProgressionEvent::new(ProgressionEventType::ArcCompleted, now);
        event
            .metadata
            .insert("result".to_string(), result.as_str().to_string());
        self.push(event);
    }

    /// Terminal FAILED or ABANDONED. `reason` lands in the event metadata when given.
    pub fn record_termination(
        &mut self,
        event_type: ProgressionEventType,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let mut event = ProgressionEvent::new(event_type, now);
        if !reason.is_empty() {
            event.metadata.insert("reason".to_string(), reason.to_string());
        }
        self.push(event);
    }

    fn push(&mut self, event: ProgressionEvent) {
        self.last_updated = event.timestamp;
        self.progression_events.push(event);
    }
}
