//! The `OpenRouterClient` struct implements `ClientWrapper` for OpenRouter's OpenAI-compatible
//! chat completions endpoint, which routes every council model (`openai/...`,
//! `google/...`, `anthropic/...`, `x-ai/...`) through one API key.
//!
//! # Key Features
//!
//! - **Tool calling**: tool definitions go out in OpenAI function format; tool calls come back
//!   with arguments that may be a JSON string or an object.
//! - **Bounded retry**: transport failures, HTTP 429 and 5xx responses are retried with
//!   exponential backoff; anything else fails immediately.
//!
//! # Example
//!
//! ```rust,no_run
//! use llmcouncil::clients::openrouter::OpenRouterClient;
//! use llmcouncil::client_wrapper::{ClientWrapper, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?);
//!     let reply = client
//!         .send_message("openai/gpt-5.2", &[Message::user("Hello!")], None)
//!         .await?;
//!     println!("{}", reply.content.unwrap_or_default());
//!     Ok(())
//! }
//! ```

use crate::llmcouncil::client_wrapper::{
    ClientWrapper, Message, ModelResponse, ProviderError, Role,
};
use crate::llmcouncil::tool_protocol::{ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    tool_incapable_models: Vec<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        OpenRouterClient {
            http,
            api_key: api_key.to_string(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            tool_incapable_models: Vec::new(),
        }
    }

    /// Point the client at another OpenAI-compatible endpoint (without `/chat/completions`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries after the first attempt, for transient failures only.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Models that reject the `tools` parameter.
    pub fn with_tool_incapable_models(mut self, models: Vec<String>) -> Self {
        self.tool_incapable_models = models;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send_once(&self, payload: &Value) -> Result<ModelResponse, ProviderError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        parse_chat_response(&data)
    }
}

/// Convert a transcript message into the chat-completions wire shape.
pub fn message_to_wire(message: &Message) -> Value {
    match message.role {
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "name": message.name.clone().unwrap_or_default(),
            "content": message.content,
        }),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let tool_calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": tool_calls,
            })
        }
        _ => json!({
            "role": message.role,
            "content": message.content,
        }),
    }
}

/// The request body for one chat completion.
pub fn build_payload(model: &str, messages: &[Message], tools: Option<&[ToolDefinition]>) -> Value {
    let mut payload = json!({
        "model": model,
        "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
    });
    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        payload["tools"] = Value::Array(tools.iter().map(ToolDefinition::to_function_schema).collect());
    }
    payload
}

/// Pull the text and tool calls out of `choices[0].message`.
pub fn parse_chat_response(data: &Value) -> Result<ModelResponse, ProviderError> {
    let message = data
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| {
            let detail = data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("response has no choices");
            ProviderError::InvalidResponse(detail.to_string())
        })?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(String::from);

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(idx, call)| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?;
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| format!("call_{}", idx));
                    let raw = function.get("arguments").unwrap_or(&Value::Null);
                    Some(ToolCallRequest::from_raw_arguments(id, name, raw))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ModelResponse::with_tool_calls(content, tool_calls))
}

#[async_trait]
impl ClientWrapper for OpenRouterClient {
    async fn send_message(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "OPENROUTER_API_KEY is not configured".to_string(),
            ));
        }

        let payload = build_payload(model, messages, tools);
        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.send_once(&payload).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "llmcouncil::clients::openrouter::OpenRouterClient::send_message({}): {} (retry {}/{} in {:?})",
                        model,
                        e,
                        attempt,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    log::error!(
                        "llmcouncil::clients::openrouter::OpenRouterClient::send_message({}): {}",
                        model,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    fn supports_tools(&self, model: &str) -> bool {
        !self.tool_incapable_models.iter().any(|m| m == model)
    }
}
