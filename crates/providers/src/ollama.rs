//! Native Ollama provider (`POST /api/chat`).
//!
//! Unlike the OpenAI-compatible endpoint, Ollama's native API carries tool
//! call arguments as JSON objects, reports `done` per turn, and accepts
//! sampling parameters under `options` (`num_predict` for the token cap).

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::message::{Message, MessageToolCall, Role};
use parley_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a caller-built client (custom timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: role_str(m.role).into(),
                content: m.content.clone(),
                tool_calls: m
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: Some(tc.id.clone()),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn build_body(request: &ProviderRequest) -> serde_json::Value {
        let mut options = serde_json::json!({
            "temperature": request.options.temperature,
            "top_p": request.options.top_p,
        });
        if let Some(max) = request.options.max_output_tokens {
            options["num_predict"] = serde_json::json!(max);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "options": options,
            "stream": false,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        if request.options.force_json {
            body["format"] = serde_json::json!("json");
        }
        body
    }

    fn into_message(api: ApiMessage) -> Message {
        let tool_calls = api
            .tool_calls
            .into_iter()
            .map(|tc| MessageToolCall {
                // Older Ollama builds omit call ids.
                id: tc
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();
        Message::assistant_with_tools(api.content, tool_calls)
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

pub(crate) fn network_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Network(e.to_string())
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = "ollama",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let usage = match (api.prompt_eval_count, api.eval_count) {
            (Some(p), Some(c)) => Some(Usage {
                prompt_tokens: p,
                completion_tokens: c,
                total_tokens: p + c,
            }),
            _ => None,
        };

        Ok(ProviderResponse {
            message: api.message.map(Self::into_message),
            done: api.done,
            usage,
            model: api.model.unwrap_or(request.model),
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(network_error)?;
        Ok(response.status().is_success())
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(force_json: bool, max: Option<i32>) -> ProviderRequest {
        ProviderRequest {
            model: "llama3.1".into(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "calculator".into(),
                description: "math".into(),
                parameters: json!({"type": "object"}),
            }],
            options: ModelOptions {
                max_output_tokens: max,
                force_json,
                ..ModelOptions::default()
            },
        }
    }

    #[test]
    fn body_carries_options_and_tools() {
        let body = OllamaProvider::build_body(&request(false, Some(-1)));
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], -1);
        assert!((body["options"]["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
        assert!(body.get("format").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn force_json_sets_format() {
        let body = OllamaProvider::build_body(&request(true, None));
        assert_eq!(body["format"], "json");
        assert!(body["options"].get("num_predict").is_none());
    }

    #[test]
    fn parses_tool_call_response() {
        let raw = r#"{
            "model": "llama3.1",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "calculator", "arguments": {"expression": "2+2"}}}]
            },
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 8
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        assert!(api.done);
        let msg = OllamaProvider::into_message(api.message.unwrap());
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "calculator");
        assert_eq!(msg.tool_calls[0].arguments["expression"], "2+2");
        assert!(msg.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn tool_messages_keep_call_id() {
        let api = OllamaProvider::to_api_messages(&[Message::tool_result("call_1", "4")]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_1"));
        assert!(api[0].tool_calls.is_empty());
    }

    #[test]
    fn missing_message_is_none() {
        let api: ApiResponse = serde_json::from_str(r#"{"done": false}"#).unwrap();
        assert!(api.message.is_none());
        assert!(!api.done);
    }
}
