//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation plus a set of callable
//! function schemas to an LLM and get one assistant message back.
//!
//! Implementations: native Ollama, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Sampling options forwarded to the backend on every inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Temperature (0.0 = deterministic, higher = more creative)
    pub temperature: f32,

    /// Nucleus-sampling parameter
    pub top_p: f32,

    /// Maximum output tokens. `None` leaves the backend default, `-1` asks
    /// for unlimited generation where the backend supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,

    /// Ask the backend to emit a JSON document
    #[serde(default)]
    pub force_json: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_output_tokens: None,
            force_json: false,
        }
    }
}

/// A single inference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "llama3.1", "gpt-4o")
    pub model: String,

    /// The full session history
    pub messages: Vec<Message>,

    /// Functions the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    pub options: ModelOptions,
}

/// A function schema sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The function name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated assistant message. `None` when the backend answered
    /// without any message payload.
    pub message: Option<Message>,

    /// Whether the backend considers the turn complete
    #[serde(default)]
    pub done: bool,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The orchestrator calls `complete()` without knowing which backend is
/// behind it. Calls may suspend for an arbitrary duration and are never
/// retried by the engine.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
