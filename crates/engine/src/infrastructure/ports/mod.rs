//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Database access (could swap SQLite -> Postgres)
//! - LLM calls (Ollama today)
//! - The quest subsystem and sibling NPC/region/faction systems
//! - Clock/Random (for testing)

mod error;
mod external;
mod repos;
mod testing;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{
    ArcFilter, ArcRepo, ArcStepRepo, IntegrationRepo, ProgressionRepo, RelationshipRepo,
};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    ChatMessage, FactionSummary, FinishReason, LlmPort, LlmRequest, LlmResponse, MessageRole,
    NpcSummary, OutputFormat, QuestGeneratorPort, RegionSummary, TokenUsage, WorldSystemsPort,
};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use repos::{
    MockArcRepo, MockArcStepRepo, MockIntegrationRepo, MockProgressionRepo, MockRelationshipRepo,
};

#[cfg(test)]
pub use external::{MockLlmPort, MockQuestGeneratorPort, MockWorldSystemsPort};

#[cfg(test)]
pub use testing::MockClockPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::{LlmError, QuestGenError, RepoError, WorldSystemError};
