//! Arc use cases.
//!
//! - `ArcManager`: lifecycle state machine and sweeps
//! - `ArcGenerator`: LLM-backed content with placeholder fallback
//! - `QuestIntegrationService`: context matching and quest generation
//! - `ProgressionTracker`: read-side reports and analytics
//! - `ArcRelationshipService`: links between arcs and outcome follow-ups

mod branching;
mod generator;
mod manager;
mod progression_tracker;
mod quest_integration;
mod relationships;

use std::sync::Arc;

use visualdm_domain::DomainError;

use crate::infrastructure::ports::RepoError;

pub use branching::{
    evaluate_branching_conditions, BranchCategory, BranchComplexity, OutcomeBranch,
    OutcomeBranchingEngine, OutcomeData, PlayerChoice, TriggeredBranch,
};
pub use generator::{ArcGenerator, GenerationContext};
pub use manager::{
    ArcComplexityReport, ArcManager, ArcPatch, ArcStatistics, NewArc, SecondaryAdvanceSummary,
    WorldEvent,
};
pub use progression_tracker::{
    AnalyticsOverview, AnalyticsPeriod, AnalyticsReport, ArcEffectiveness, ArcImpact, Bottleneck,
    CohortAnalysis, CohortMetric, CohortRow, CohortType, CompletionTrends, CustomReport,
    CustomReportRequest, EngagementMetrics, ExportFormat, FailureAnalysis, PerformanceMetrics,
    PredictionAccuracy, ProgressionReport, ProgressionTracker, SuccessPatterns, SystemHealth,
    TrendPoint, TrendSummary,
};
pub use quest_integration::{
    calculate_context_match, tag_boost, ArcQuestOpportunity, QuestIntegrationService,
    QuestOpportunity,
};
pub use relationships::{
    analyze_network, suggest_links, ArcRelationshipService, ConnectedArc, FollowUpArc,
    FollowUpMetadata, FollowUpRequest, NarrativeChain, NewRelationship, RelationshipNetwork,
    RelationshipSuggestion,
};

/// Container for arc use cases.
pub struct ArcUseCases {
    pub manager: Arc<ArcManager>,
    pub generator: Arc<ArcGenerator>,
    pub quests: Arc<QuestIntegrationService>,
    pub tracker: Arc<ProgressionTracker>,
    pub relationships: Arc<ArcRelationshipService>,
}

impl ArcUseCases {
    pub fn new(
        manager: Arc<ArcManager>,
        generator: Arc<ArcGenerator>,
        quests: Arc<QuestIntegrationService>,
        tracker: Arc<ProgressionTracker>,
        relationships: Arc<ArcRelationshipService>,
    ) -> Self {
        Self {
            manager,
            generator,
            quests,
            tracker,
            relationships,
        }
    }
}

/// Errors shared by the arc services.
#[derive(Debug, thiserror::Error)]
pub enum ArcError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    InvalidTransition(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

impl ArcError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<DomainError> for ArcError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidStateTransition(msg) => Self::InvalidTransition(msg),
            DomainError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            DomainError::Validation(msg)
            | DomainError::Constraint(msg)
            | DomainError::Parse(msg) => Self::Validation(msg),
        }
    }
}
