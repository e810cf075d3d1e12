//! Visual DM domain - arc types, value objects and invariants.
//!
//! Pure data and rules: no I/O, no async, no randomness.

extern crate self as visualdm_domain;

pub mod business_rules;
pub mod entities;
pub mod error;
pub mod ids;
pub mod value_objects;

pub use entities::{
    relationship_violations, ArcCompletionRecord, ArcCompletionResult, ArcInfluenceLevel,
    ArcPriority, ArcProgression, ArcQuestMapping, ArcRelationship, ArcRelationshipType,
    ArcStatus, ArcStep, ArcStepStatus, ArcStepTag, ArcStepType, ArcSystemIntegration, ArcType,
    CompletionCriteria, CriteriaKind, IntegrationStatus, ProgressionEvent, ProgressionEventType,
    ProgressionMethod, QuestMappingType, StoryArc, SystemHookConfiguration,
};

pub use error::DomainError;

pub use ids::{
    ArcId, ArcStepId, CompletionRecordId, HookConfigId, IntegrationId, ProgressionId,
    QuestMappingId, RelationshipId,
};

pub use value_objects::{ArcTypeConfig, ComplexityTier, ContextValue, QuestContext};
