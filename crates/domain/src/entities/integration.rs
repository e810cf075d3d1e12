//! Records bridging arcs to the quest system and other sibling systems

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArcId, ArcStep, ArcStepId, HookConfigId, IntegrationId, QuestMappingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestMappingType {
    /// Completing the quest completes the step
    #[default]
    Direct,
    /// Quest only counts when its requirements hold
    Conditional,
    /// Flavour quest, does not drive the arc
    Background,
    /// Quest kicks the step off
    Trigger,
}

/// Links one arc step to the quests generated from it.
///
/// `generated_quests` only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcQuestMapping {
    id: QuestMappingId,
    arc_id: ArcId,
    step_id: ArcStepId,
    mapping_type: QuestMappingType,
    location_requirements: Vec<String>,
    npc_requirements: Vec<String>,
    faction_requirements: Vec<String>,
    character_requirements: Vec<String>,
    generated_quests: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ArcQuestMapping {
    pub fn new(arc_id: ArcId, step_id: ArcStepId, now: DateTime<Utc>) -> Self {
        Self {
            id: QuestMappingId::new(),
            arc_id,
            step_id,
            mapping_type: QuestMappingType::default(),
            location_requirements: Vec::new(),
            npc_requirements: Vec::new(),
            faction_requirements: Vec::new(),
            character_requirements: Vec::new(),
            generated_quests: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a mapping whose requirements mirror the step's required tags.
    pub fn for_step(step: &ArcStep, now: DateTime<Utc>) -> Self {
        let mut mapping = Self::new(step.arc_id(), step.id(), now);
        for tag in step.tags().iter().filter(|t| t.required) {
            let bucket = match tag.key.as_str() {
                "location" => &mut mapping.location_requirements,
                "npc" => &mut mapping.npc_requirements,
                "faction" => &mut mapping.faction_requirements,
                "character" => &mut mapping.character_requirements,
                _ => continue,
            };
            bucket.push(tag.value.clone());
        }
        if mapping.has_requirements() {
            mapping.mapping_type = QuestMappingType::Conditional;
        }
        mapping
    }

    pub fn id(&self) -> QuestMappingId {
        self.id
    }

    pub fn arc_id(&self) -> ArcId {
        self.arc_id
    }

    pub fn step_id(&self) -> ArcStepId {
        self.step_id
    }

    pub fn mapping_type(&self) -> QuestMappingType {
        self.mapping_type
    }

    pub fn location_requirements(&self) -> &[String] {
        &self.location_requirements
    }

    pub fn npc_requirements(&self) -> &[String] {
        &self.npc_requirements
    }

    pub fn faction_requirements(&self) -> &[String] {
        &self.faction_requirements
    }

    pub fn character_requirements(&self) -> &[String] {
        &self.character_requirements
    }

    pub fn generated_quests(&self) -> &[String] {
        &self.generated_quests
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn with_mapping_type(mut self, mapping_type: QuestMappingType) -> Self {
        self.mapping_type = mapping_type;
        self
    }

    pub fn has_requirements(&self) -> bool {
        !(self.location_requirements.is_empty()
            && self.npc_requirements.is_empty()
            && self.faction_requirements.is_empty()
            && self.character_requirements.is_empty())
    }

    /// Append a quest id. Duplicates are ignored.
    pub fn add_generated_quest(&mut self, quest_id: impl Into<String>, now: DateTime<Utc>) {
        let quest_id = quest_id.into();
        if !self.generated_quests.contains(&quest_id) {
            self.generated_quests.push(quest_id);
            self.updated_at = now;
        }
    }

    pub fn references_quest(&self, quest_id: &str) -> bool {
        self.generated_quests.iter().any(|q| q == quest_id)
    }
}

/// Which events an arc forwards to a sibling system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHookConfiguration {
    pub id: HookConfigId,
    pub arc_id: ArcId,
    pub system_name: String,
    pub event_types: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl SystemHookConfiguration {
    pub const DEFAULT_EVENT_TYPES: [&'static str; 3] =
        ["arc_activated", "step_completed", "arc_completed"];

    pub fn new(arc_id: ArcId, system_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: HookConfigId::new(),
            arc_id,
            system_name: system_name.into(),
            event_types: Self::DEFAULT_EVENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enabled: true,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Active,
    Degraded,
    Offline,
}

/// Aggregate health of the link to one sibling system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcSystemIntegration {
    pub id: IntegrationId,
    pub system_name: String,
    pub status: IntegrationStatus,
    pub total_events: u64,
    pub successful_events: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub health_score: f64,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ArcSystemIntegration {
    /// Smoothing factor for the running averages
    pub const SMOOTHING: f64 = 0.2;
    pub const DEGRADED_BELOW: f64 = 0.7;
    pub const OFFLINE_BELOW: f64 = 0.3;

    pub fn new(system_name: impl Into<String>) -> Self {
        Self {
            id: IntegrationId::new(),
            system_name: system_name.into(),
            status: IntegrationStatus::Active,
            total_events: 0,
            successful_events: 0,
            success_rate: 1.0,
            average_response_time_ms: 0.0,
            health_score: 1.0,
            last_event_at: None,
        }
    }

    /// Fold one call outcome into the running metrics.
    pub fn update_metrics(&mut self, success: bool, response_time_ms: f64, now: DateTime<Utc>) {
        let first_sample = self.total_events == 0;
        self.total_events += 1;
        if success {
            self.successful_events += 1;
        }
        self.success_rate = self.successful_events as f64 / self.total_events as f64;

        self.average_response_time_ms = if first_sample {
            response_time_ms
        } else {
            Self::SMOOTHING * response_time_ms
                + (1.0 - Self::SMOOTHING) * self.average_response_time_ms
        };

        let sample = if success { 1.0 } else { 0.0 };
        self.health_score = Self::SMOOTHING * sample + (1.0 - Self::SMOOTHING) * self.health_score;

        self.status = if self.health_score < Self::OFFLINE_BELOW {
            IntegrationStatus::Offline
        } else if self.health_score < Self::DEGRADED_BELOW {
            IntegrationStatus::Degraded
        } else {
            IntegrationStatus::Active
        };
        self.last_event_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArcStepTag;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn generated_quests_grow_without_duplicates() {
        let mut mapping = ArcQuestMapping::new(ArcId::new(), ArcStepId::new(), fixed_time());
        mapping.add_generated_quest("quest_a", fixed_time());
        mapping.add_generated_quest("quest_b", fixed_time());
        mapping.add_generated_quest("quest_a", fixed_time());

        assert_eq!(mapping.generated_quests(), &["quest_a", "quest_b"]);
        assert!(mapping.references_quest("quest_b"));
        assert!(!mapping.references_quest("quest_c"));
    }

    #[test]
    fn mapping_for_step_copies_required_tags() {
        let step = ArcStep::new(ArcId::new(), 0, "Meet the fence", fixed_time()).with_tags(vec![
            ArcStepTag::new("location", "tavern").required(),
            ArcStepTag::new("npc", "fence"),
            ArcStepTag::new("faction", "thieves").required(),
        ]);

        let mapping = ArcQuestMapping::for_step(&step, fixed_time());
        assert_eq!(mapping.location_requirements(), &["tavern"]);
        assert!(mapping.npc_requirements().is_empty());
        assert_eq!(mapping.faction_requirements(), &["thieves"]);
        assert_eq!(mapping.mapping_type(), QuestMappingType::Conditional);
    }

    #[test]
    fn update_metrics_tracks_running_averages() {
        let mut integration = ArcSystemIntegration::new("quest");
        integration.update_metrics(true, 100.0, fixed_time());
        assert_eq!(integration.average_response_time_ms, 100.0);
        assert_eq!(integration.success_rate, 1.0);

        integration.update_metrics(false, 200.0, fixed_time());
        assert!((integration.average_response_time_ms - 120.0).abs() < 1e-9);
        assert_eq!(integration.success_rate, 0.5);
        assert!((integration.health_score - 0.8).abs() < 1e-9);
        assert_eq!(integration.status, IntegrationStatus::Active);
    }

    #[test]
    fn repeated_failures_degrade_then_take_offline() {
        let mut integration = ArcSystemIntegration::new("npc");
        for _ in 0..2 {
            integration.update_metrics(false, 10.0, fixed_time());
        }
        assert_eq!(integration.status, IntegrationStatus::Degraded);
        for _ in 0..4 {
            integration.update_metrics(false, 10.0, fixed_time());
        }
        assert_eq!(integration.status, IntegrationStatus::Offline);
    }
}
