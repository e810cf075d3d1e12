//! ArcCompletionRecord - immutable record written once when an arc ends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{ArcId, CompletionRecordId};

use super::arc::StoryArc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcCompletionResult {
    Success,
    Failure,
    Partial,
}

impl ArcCompletionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArcCompletionResult::Success => "success",
            ArcCompletionResult::Failure => "failure",
            ArcCompletionResult::Partial => "partial",
        }
    }
}

impl std::fmt::Display for ArcCompletionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArcCompletionResult {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "partial" => Ok(Self::Partial),
            _ => Err(DomainError::parse(format!(
                "Invalid completion result: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcCompletionRecord {
    id: CompletionRecordId,
    arc_id: ArcId,
    completion_result: ArcCompletionResult,
    narrative_outcome: String,
    world_consequences: Vec<String>,
    /// Copied from the arc so successors can be seeded without another lookup
    affected_regions: Vec<String>,
    affected_factions: Vec<String>,
    final_step: u32,
    total_steps: u32,
    completed_at: DateTime<Utc>,
}

impl ArcCompletionRecord {
    pub fn new(
        arc: &StoryArc,
        completion_result: ArcCompletionResult,
        narrative_outcome: impl Into<String>,
        world_consequences: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CompletionRecordId::new(),
            arc_id: arc.id(),
            completion_result,
            narrative_outcome: narrative_outcome.into(),
            world_consequences,
            affected_regions: arc.region_id().map(str::to_string).into_iter().collect(),
            affected_factions: arc.faction_ids().to_vec(),
            final_step: arc.current_step(),
            total_steps: arc.total_steps(),
            completed_at: now,
        }
    }

    pub fn id(&self) -> CompletionRecordId {
        self.id
    }

    pub fn arc_id(&self) -> ArcId {
        self.arc_id
    }

    pub fn completion_result(&self) -> ArcCompletionResult {
        self.completion_result
    }

    pub fn narrative_outcome(&self) -> &str {
        &self.narrative_outcome
    }

    pub fn world_consequences(&self) -> &[String] {
        &self.world_consequences
    }

    pub fn affected_regions(&self) -> &[String] {
        &self.affected_regions
    }

    pub fn affected_factions(&self) -> &[String] {
        &self.affected_factions
    }

    pub fn final_step(&self) -> u32 {
        self.final_step
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}
