//! The model query primitive used by every stage of the council.
//!
//! A [`ClientWrapper`] does not keep track of the conversation; each tool-calling loop owns its
//! own transcript and hands the full message list to the wrapper on every call.

use crate::llmcouncil::tool_protocol::{ToolCallRequest, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Represents the possible roles for a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Steers the model's behaviour for the whole transcript.
    System,
    /// The person (or app) asking.
    User,
    /// The model's own turns, including tool requests.
    Assistant,
    /// The output of a tool the assistant asked for, linked by `tool_call_id`.
    Tool,
}

/// Represents a generic message sent to (or received from) an LLM.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
    /// Tool calls requested by an assistant message, in the order the model issued them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For `Role::Tool` messages, the id of the request this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `Role::Tool` messages, the name of the tool that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// An assistant message that carries the tool calls the model asked for.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// The result of one tool call, answering the request with id `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// What a model answered: optional text plus any tool calls it wants executed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    /// A plain text answer with no tool requests.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A response asking for tools, optionally with some accompanying text.
    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content,
            tool_calls,
        }
    }

    /// The textual content, treating whitespace-only text as absent.
    pub fn text_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Failure of the model query primitive.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// The request never produced an HTTP response (DNS, connect, timeout, ...).
    Transport(String),
    /// The provider answered with a non-success status code.
    Status { status: u16, body: String },
    /// The provider answered, but the payload could not be understood.
    InvalidResponse(String),
    /// The client is missing something it needs, e.g. an API key.
    Configuration(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::InvalidResponse(_) | ProviderError::Configuration(_) => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ProviderError::Status { status, body } => {
                write!(f, "Provider returned HTTP {}: {}", status, body)
            }
            ProviderError::InvalidResponse(msg) => write!(f, "Invalid provider response: {}", msg),
            ProviderError::Configuration(msg) => write!(f, "Provider misconfigured: {}", msg),
        }
    }
}

impl Error for ProviderError {}

/// Trait defining the interface to interact with an LLM provider.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the transcript to `model` and get its next response.
    /// - `tools`: definitions to advertise; `None` omits the tools parameter entirely.
    async fn send_message(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, ProviderError>;

    /// Whether `model` accepts tool definitions. Defaults to `true`; providers that know
    /// better can override it.
    fn supports_tools(&self, _model: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_ignores_blank_text() {
        assert_eq!(ModelResponse::text("  ").text_content(), None);
        assert_eq!(ModelResponse::text(" hi ").text_content(), Some("hi"));
        assert_eq!(ModelResponse::default().text_content(), None);
    }

    #[test]
    fn transient_errors() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(ProviderError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!ProviderError::Status {
            status: 401,
            body: String::new()
        }
        .is_transient());
        assert!(!ProviderError::InvalidResponse("no choices".into()).is_transient());
    }

    #[test]
    fn tool_result_links_request() {
        let msg = Message::tool_result("call_1", "calculator", "4");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("calculator"));
    }
}
