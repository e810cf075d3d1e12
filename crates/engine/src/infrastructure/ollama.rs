//! Ollama client for arc and step generation, over the native `/api/chat` endpoint.
//!
//! Generation prompts ask for a single JSON document. Those requests switch
//! Ollama into JSON mode and the reply is checked before it reaches the
//! generator, so a truncated or chatty reply surfaces as `InvalidResponse`
//! (which the resilient wrapper retries) instead of a silent parse miss.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{
    FinishReason, LlmError, LlmPort, LlmRequest, LlmResponse, MessageRole, OutputFormat,
    TokenUsage,
};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Arc drafts with five or six steps run long on small local models.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatTurn {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|msg| ChatTurn {
            role: role_name(msg.role).to_string(),
            content: msg.content.clone(),
        }));

        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: (request.output == OutputFormat::Json).then_some("json"),
            options,
        }
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

#[async_trait]
impl LlmPort for OllamaClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.chat_request(&request);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            return Err(LlmError::RequestFailed(format!("{}: {}", status, error_text)));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        tracing::debug!(
            model = %self.model,
            prompt_tokens = reply.prompt_eval_count,
            completion_tokens = reply.eval_count,
            "Ollama reply received"
        );
        into_response(reply, request.output)
    }
}

fn into_response(reply: ChatReply, output: OutputFormat) -> Result<LlmResponse, LlmError> {
    let content = reply.message.content.trim().to_string();

    if output == OutputFormat::Json {
        if content.is_empty() {
            return Err(LlmError::InvalidResponse("Empty reply in JSON mode".to_string()));
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&content) {
            return Err(LlmError::InvalidResponse(format!(
                "Reply is not a JSON document: {}",
                e
            )));
        }
    }

    let finish_reason = match reply.done_reason.as_deref() {
        Some("stop") | None => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some(_) => FinishReason::Unknown,
    };

    let usage = match (reply.prompt_eval_count, reply.eval_count) {
        (Some(prompt), Some(completion)) => Some(TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }),
        _ => None,
    };

    Ok(LlmResponse {
        content,
        finish_reason,
        usage,
    })
}

// Wire types for /api/chat

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatTurn>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatTurn {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ChatTurn,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}
