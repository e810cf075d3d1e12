//! External service port traits (LLM, quest system, sibling world systems).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use visualdm_domain::{ArcStep, QuestContext};

use super::error::{LlmError, QuestGenError, WorldSystemError};

// =============================================================================
// LLM Types
// =============================================================================

/// LLM request/response types
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The conversation history
    pub messages: Vec<ChatMessage>,
    /// System prompt / context
    pub system_prompt: Option<String>,
    /// Temperature for response generation (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    pub output: OutputFormat,
}

/// Shape the caller expects the reply content to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// A single JSON document, no prose around it
    Json,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            output: OutputFormat::Text,
        }
    }

    pub fn expecting_json(mut self) -> Self {
        self.output = OutputFormat::Json;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated text content
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Option<TokenUsage>,
}

/// Reason the generation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    #[serde(other)]
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

// =============================================================================
// Quest System
// =============================================================================

/// Asks the quest subsystem to materialize a quest for an arc step.
///
/// `Ok(None)` means the quest system declined (nothing suitable), not a failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestGeneratorPort: Send + Sync {
    async fn generate_quest(
        &self,
        step: &ArcStep,
        context: &QuestContext,
    ) -> Result<Option<String>, QuestGenError>;
}

// =============================================================================
// Sibling World Systems
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpcSummary {
    pub id: String,
    pub name: String,
    pub personality: String,
    pub goals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub id: String,
    pub name: String,
    pub climate: String,
    pub tensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactionSummary {
    pub id: String,
    pub name: String,
    pub agenda: String,
    pub power_level: i32,
}

/// Read access to the NPC, region and faction systems used to ground generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorldSystemsPort: Send + Sync {
    async fn npc_summary(&self, npc_id: &str) -> Result<NpcSummary, WorldSystemError>;
    async fn region_summary(&self, region_id: &str) -> Result<RegionSummary, WorldSystemError>;
    async fn faction_summary(&self, faction_id: &str) -> Result<FactionSummary, WorldSystemError>;
}
