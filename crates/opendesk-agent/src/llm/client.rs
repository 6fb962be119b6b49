//! Chat-completions client for the model provider.
//!
//! Targets the OpenAI-compatible chat-completions API (the base URL is
//! overridable for compatible endpoints). Quota and rate-limit rejections
//! are surfaced as [`AgentError::QuotaExhausted`] so the orchestrator can
//! engage the fallback generator instead of failing the request.

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::types::{ChatMessage, ChatRequest, Completion, Role, ToolCall, ToolDefinition};

/// Default chat-completions base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Placeholder key value shipped in sample env files; treated as missing.
const PLACEHOLDER_API_KEY: &str = "your-openai-api-key-here";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to the model provider.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Create a configuration for the default endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: model.into(),
            max_tokens: 1024,
        }
    }

    /// Override the base URL (for compatible endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A client for the provider's chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    ///
    /// Fails with [`AgentError::MissingApiKey`] when the key is absent or
    /// still the sample placeholder — callers construct the client lazily so
    /// this fails the individual request, never process startup.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() || config.api_key == PLACEHOLDER_API_KEY {
            return Err(AgentError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// Send a chat request and return the parsed completion.
    pub async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %self.config.model, "sending model request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            if is_quota_rejection(status, &text) {
                return Err(AgentError::QuotaExhausted {
                    reason: format!("API returned {status}"),
                });
            }
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        parse_completion(&v)
    }

    /// Build the JSON body for the chat-completions endpoint.
    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages_to_wire(&request.messages),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if !request.tools.is_empty() {
            body["tools"] = tools_to_wire(&request.tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

// ---------------------------------------------------------------------------
// Wire conversion (free functions)
// ---------------------------------------------------------------------------

/// Detect quota / rate-limit rejections from the provider.
fn is_quota_rejection(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("insufficient_quota") || lower.contains("rate limit")
}

/// Convert internal messages to the chat-completions wire format.
///
/// System messages are part of the `messages` array, tool calls live in
/// `assistant.tool_calls` with JSON-string arguments, and tool results use
/// `role: "tool"` with a `tool_call_id`.
fn messages_to_wire(messages: &[ChatMessage]) -> Vec<Value> {
    let mut wire: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => {
                wire.push(json!({ "role": "system", "content": msg.content }));
            }
            Role::User => {
                wire.push(json!({ "role": "user", "content": msg.content }));
            }
            Role::Assistant => {
                if msg.tool_calls.is_empty() {
                    wire.push(json!({ "role": "assistant", "content": msg.content }));
                } else {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();

                    let mut m = json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });
                    if !msg.content.is_empty() {
                        m["content"] = json!(msg.content);
                    }
                    wire.push(m);
                }
            }
            Role::Tool => {
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id,
                    "content": msg.content,
                }));
            }
        }
    }

    wire
}

/// Convert tool definitions to the chat-completions format, which wraps
/// each tool in `{"type": "function", "function": {...}}`.
fn tools_to_wire(tools: &[ToolDefinition]) -> Value {
    let values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect();
    json!(values)
}

/// Parse a chat-completions response into a [`Completion`].
fn parse_completion(v: &Value) -> Result<Completion> {
    let message = &v["choices"][0]["message"];

    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    let text = message["content"].as_str().unwrap_or_default().to_owned();

    let tool_calls = match message["tool_calls"].as_array() {
        Some(arr) => arr
            .iter()
            .map(|tc| {
                let func = &tc["function"];
                let name = func["name"].as_str().unwrap_or_default().to_owned();
                let args_str = func["arguments"].as_str().unwrap_or("{}");
                let arguments: Value =
                    serde_json::from_str(args_str).map_err(|e| AgentError::LlmParseFailed {
                        reason: format!("invalid JSON in tool call `{name}` arguments: {e}"),
                    })?;

                Ok(ToolCall {
                    id: tc["id"].as_str().unwrap_or_default().to_owned(),
                    name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(Completion { text, tool_calls })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> LlmClient {
        LlmClient::new(LlmClientConfig::new("sk-test", "gpt-4-turbo-preview")).unwrap()
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = LlmClient::new(LlmClientConfig::new("", "gpt-4-turbo-preview"));
        assert!(matches!(result, Err(AgentError::MissingApiKey)));
    }

    #[test]
    fn placeholder_api_key_is_rejected() {
        let result = LlmClient::new(LlmClientConfig::new(
            "your-openai-api-key-here",
            "gpt-4-turbo-preview",
        ));
        assert!(matches!(result, Err(AgentError::MissingApiKey)));
    }

    #[test]
    fn base_url_override() {
        let config =
            LlmClientConfig::new("key", "llama3").with_base_url("http://localhost:11434/v1");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn request_body_basic() {
        let client = test_client();
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system("You are helpful."),
                ChatMessage::user("Hello"),
            ],
            tools: vec![],
            temperature: Some(0.7),
            max_tokens: Some(512),
        };

        let body = client.build_request_body(&request);

        assert_eq!(body["model"], "gpt-4-turbo-preview");
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("tools").is_none());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "You are helpful.");
        assert_eq!(messages[1]["role"], "user");

        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 1e-6);
    }

    #[test]
    fn request_body_with_tools_sets_auto_choice() {
        let client = test_client();
        let request = ChatRequest {
            messages: vec![ChatMessage::user("Where is ORD-002?")],
            tools: vec![ToolDefinition {
                name: "fetch_order_details".into(),
                description: "Fetch order details".into(),
                parameters: json!({
                    "type": "object",
                    "properties": { "orderNumber": {"type": "string"} },
                    "required": ["orderNumber"]
                }),
            }],
            temperature: None,
            max_tokens: None,
        };

        let body = client.build_request_body(&request);

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "fetch_order_details");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn messages_to_wire_tool_round_trip() {
        let messages = vec![
            ChatMessage::user("Check ORD-002"),
            ChatMessage::assistant_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_abc".into(),
                    name: "fetch_order_details".into(),
                    arguments: json!({"orderNumber": "ORD-002"}),
                }],
            ),
            ChatMessage::tool_result("call_abc", r#"{"order":{"status":"SHIPPED"}}"#),
        ];

        let wire = messages_to_wire(&messages);

        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[1]["role"], "assistant");
        let tc = &wire[1]["tool_calls"][0];
        assert_eq!(tc["id"], "call_abc");
        assert_eq!(tc["type"], "function");
        // Arguments are serialized as a JSON string.
        let args: Value =
            serde_json::from_str(tc["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["orderNumber"], "ORD-002");
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "call_abc");
    }

    #[test]
    fn parse_text_completion() {
        let response = json!({
            "id": "chatcmpl-abc",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Happy to help!" },
                "finish_reason": "stop"
            }],
        });

        let completion = parse_completion(&response).unwrap();
        assert_eq!(completion.text, "Happy to help!");
        assert!(!completion.wants_tools());
    }

    #[test]
    fn parse_tool_call_completion() {
        let response = json!({
            "id": "chatcmpl-abc",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_xyz",
                        "type": "function",
                        "function": {
                            "name": "get_invoice_details",
                            "arguments": "{\"invoiceNumber\":\"INV-002\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
        });

        let completion = parse_completion(&response).unwrap();
        assert!(completion.wants_tools());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "get_invoice_details");
        assert_eq!(
            completion.tool_calls[0].arguments["invoiceNumber"],
            "INV-002"
        );
    }

    #[test]
    fn parse_missing_message_is_error() {
        let response = json!({"choices": []});
        assert!(parse_completion(&response).is_err());
    }

    #[test]
    fn quota_rejection_detection() {
        assert!(is_quota_rejection(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(is_quota_rejection(
            StatusCode::FORBIDDEN,
            r#"{"error":{"code":"insufficient_quota"}}"#
        ));
        assert!(is_quota_rejection(
            StatusCode::BAD_REQUEST,
            "Rate limit reached for requests"
        ));
        assert!(!is_quota_rejection(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream exploded"
        ));
    }
}
