//! Repository port traits for database access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use visualdm_domain::*;

use super::error::RepoError;

/// Optional filters for listing arcs. Empty filter lists everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArcFilter {
    pub status: Option<ArcStatus>,
    pub arc_type: Option<ArcType>,
    pub created_after: Option<DateTime<Utc>>,
}

impl ArcFilter {
    pub fn with_status(mut self, status: ArcStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, arc_type: ArcType) -> Self {
        self.arc_type = Some(arc_type);
        self
    }

    pub fn created_after(mut self, since: DateTime<Utc>) -> Self {
        self.created_after = Some(since);
        self
    }
}

// =============================================================================
// Arc Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArcRepo: Send + Sync {
    // CRUD
    async fn get(&self, id: ArcId) -> Result<Option<StoryArc>, RepoError>;
    async fn save(&self, arc: &StoryArc) -> Result<(), RepoError>;
    /// Removes the arc together with its steps, progression, completion, mappings
    /// and every relationship it takes part in.
    async fn delete(&self, id: ArcId) -> Result<(), RepoError>;

    // Queries
    async fn list(&self, filter: ArcFilter) -> Result<Vec<StoryArc>, RepoError>;
    async fn count_by_type_and_status(
        &self,
        arc_type: ArcType,
        status: ArcStatus,
    ) -> Result<usize, RepoError>;

    // Units of work (single transaction)
    /// First write of an arc: the arc, its empty progression, its steps and hooks.
    async fn register(
        &self,
        arc: &StoryArc,
        progression: &ArcProgression,
        steps: &[ArcStep],
        hooks: &[SystemHookConfiguration],
    ) -> Result<(), RepoError>;
    async fn save_with_progression(
        &self,
        arc: &StoryArc,
        progression: &ArcProgression,
    ) -> Result<(), RepoError>;
    async fn save_completion(
        &self,
        arc: &StoryArc,
        progression: &ArcProgression,
        record: &ArcCompletionRecord,
    ) -> Result<(), RepoError>;

    async fn get_completion(&self, arc_id: ArcId)
        -> Result<Option<ArcCompletionRecord>, RepoError>;
    async fn list_completions(&self) -> Result<Vec<ArcCompletionRecord>, RepoError>;
}

// =============================================================================
// Step Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArcStepRepo: Send + Sync {
    async fn get(&self, id: ArcStepId) -> Result<Option<ArcStep>, RepoError>;
    async fn save(&self, step: &ArcStep) -> Result<(), RepoError>;
    /// All-or-nothing insert/update of several steps.
    async fn save_all(&self, steps: &[ArcStep]) -> Result<(), RepoError>;

    /// Ordered by `step_index`.
    async fn list_for_arc(&self, arc_id: ArcId) -> Result<Vec<ArcStep>, RepoError>;
    async fn get_by_index(
        &self,
        arc_id: ArcId,
        step_index: u32,
    ) -> Result<Option<ArcStep>, RepoError>;
    /// PENDING or AVAILABLE steps of arcs that are ACTIVE.
    async fn list_open_for_quests(&self) -> Result<Vec<ArcStep>, RepoError>;
}

// =============================================================================
// Progression Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressionRepo: Send + Sync {
    async fn get_for_arc(&self, arc_id: ArcId) -> Result<Option<ArcProgression>, RepoError>;
    async fn save(&self, progression: &ArcProgression) -> Result<(), RepoError>;
    async fn list(&self) -> Result<Vec<ArcProgression>, RepoError>;
}

// =============================================================================
// Integration Storage (quest mappings, hooks, system health)
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntegrationRepo: Send + Sync {
    // Quest mappings
    async fn get_mapping_for_step(
        &self,
        step_id: ArcStepId,
    ) -> Result<Option<ArcQuestMapping>, RepoError>;
    async fn save_mapping(&self, mapping: &ArcQuestMapping) -> Result<(), RepoError>;
    async fn list_mappings_for_quest(
        &self,
        quest_id: &str,
    ) -> Result<Vec<ArcQuestMapping>, RepoError>;
    async fn list_mappings_for_arc(&self, arc_id: ArcId)
        -> Result<Vec<ArcQuestMapping>, RepoError>;

    // System hooks
    async fn save_hook(&self, hook: &SystemHookConfiguration) -> Result<(), RepoError>;
    async fn list_hooks_for_arc(
        &self,
        arc_id: ArcId,
    ) -> Result<Vec<SystemHookConfiguration>, RepoError>;

    // System health
    async fn get_integration(
        &self,
        system_name: &str,
    ) -> Result<Option<ArcSystemIntegration>, RepoError>;
    async fn save_integration(&self, integration: &ArcSystemIntegration) -> Result<(), RepoError>;
    async fn list_integrations(&self) -> Result<Vec<ArcSystemIntegration>, RepoError>;
}

// =============================================================================
// Relationship Storage
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationshipRepo: Send + Sync {
    async fn get(&self, id: RelationshipId) -> Result<Option<ArcRelationship>, RepoError>;
    async fn save(&self, relationship: &ArcRelationship) -> Result<(), RepoError>;
    async fn delete(&self, id: RelationshipId) -> Result<(), RepoError>;
    /// Oldest first.
    async fn list(&self) -> Result<Vec<ArcRelationship>, RepoError>;
    /// Links where the arc is either source or target, oldest first.
    async fn list_for_arc(&self, arc_id: ArcId) -> Result<Vec<ArcRelationship>, RepoError>;
}
