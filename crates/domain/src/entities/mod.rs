//! Domain entities - Core business objects with identity

mod arc;
mod arc_step;
mod completion;
mod integration;
mod progression;
mod relationship;

pub use arc::{ArcPriority, ArcStatus, ArcType, StoryArc};
pub use arc_step::{
    ArcStep, ArcStepStatus, ArcStepTag, ArcStepType, CompletionCriteria, CriteriaKind,
};
pub use completion::{ArcCompletionRecord, ArcCompletionResult};
pub use integration::{
    ArcQuestMapping, ArcSystemIntegration, IntegrationStatus, QuestMappingType,
    SystemHookConfiguration,
};
pub use progression::{
    ArcProgression, ProgressionEvent, ProgressionEventType, ProgressionMethod,
};
pub use relationship::{
    relationship_violations, ArcInfluenceLevel, ArcRelationship, ArcRelationshipType,
};
