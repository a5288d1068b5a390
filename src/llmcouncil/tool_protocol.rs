//! Tool Protocol Types
//!
//! The vocabulary shared by the tool executor, the tool-calling loop, and the model
//! clients: what a tool looks like to a model ([`ToolDefinition`]), what a model asks for
//! ([`ToolCallRequest`]), what the executor hands back ([`ToolOutcome`]) and what gets
//! recorded in a Stage-1 result ([`ToolCallRecord`]).
//!
//! # Example
//!
//! ```rust
//! use llmcouncil::tool_protocol::{ToolDefinition, ToolParameter, ToolParameterType};
//!
//! let calculator = ToolDefinition::new("calculator", "Perform mathematical calculations")
//!     .with_parameter(
//!         ToolParameter::new("expression", ToolParameterType::String)
//!             .with_description("The mathematical expression to evaluate")
//!             .required(),
//!     );
//!
//! let schema = calculator.to_function_schema();
//! assert_eq!(schema["function"]["name"], "calculator");
//! assert_eq!(schema["function"]["parameters"]["required"][0], "expression");
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
}

impl ToolParameter {
    /// Define a new tool parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
        }
    }

    /// Add a human readable description that will surface in generated schemas.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A tool as advertised to models: name, description and parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    /// Create a definition with the supplied identifier and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter definition.
    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Render the definition in the OpenAI/OpenRouter function-calling format.
    pub fn to_function_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut property = serde_json::Map::new();
            property.insert(
                "type".to_string(),
                serde_json::to_value(&param.param_type).unwrap_or(serde_json::Value::Null),
            );
            if let Some(description) = &param.description {
                property.insert(
                    "description".to_string(),
                    serde_json::Value::String(description.clone()),
                );
            }
            properties.insert(param.name.clone(), serde_json::Value::Object(property));
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// A tool invocation requested by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned id linking the request to its result message.
    pub id: String,
    pub name: String,
    /// Untyped arguments; validated only by the tool itself.
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a request from arguments that may arrive as a JSON-encoded string.
    /// Unparseable strings become an empty object.
    pub fn from_raw_arguments(
        id: impl Into<String>,
        name: impl Into<String>,
        raw: &serde_json::Value,
    ) -> Self {
        let arguments = match raw {
            serde_json::Value::String(encoded) => serde_json::from_str(encoded)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        Self::new(id, name, arguments)
    }
}

/// What the executor hands back to the calling model. Never an exception: failures are
/// text the model can read and react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Text fed back to the model as the tool result.
    pub text: String,
    /// Present when the tool failed; `text` then carries a readable version of it.
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Convenience constructor for successful tool execution.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    /// Convenience constructor for failed tool execution.
    pub fn failure(error: &ToolError) -> Self {
        Self {
            text: format!("Error: {}", error),
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One finished tool call, as recorded in a model's Stage-1 result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: serde_json::Value,
    /// The text handed back to the model (result or readable error).
    pub result: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolCallRecord {
    pub fn new(request: &ToolCallRequest, outcome: ToolOutcome, duration: Duration) -> Self {
        Self {
            name: request.name.clone(),
            arguments: request.arguments.clone(),
            result: outcome.text,
            error: outcome.error,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Error types for tool operations
#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    /// The requested tool is not part of the advertised set.
    UnsupportedTool(String),
    /// The arguments are missing a required key or have the wrong shape.
    InvalidArguments(String),
    /// A backing provider failed (missing credential, network error, non-2xx status).
    /// This is the only error that moves a fallback chain on to its next provider.
    Provider(String),
    /// A single provider attempt exceeded its wall-clock budget.
    Timeout(Duration),
    /// The input uses syntax or symbols the tool refuses to evaluate.
    Disallowed(String),
    /// The tool ran but could not produce a value.
    ExecutionFailed(String),
    /// Every provider in a fallback chain failed.
    Unavailable(String),
}

impl ToolError {
    /// Whether the next provider in a fallback chain should be tried.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, ToolError::Provider(_) | ToolError::Timeout(_))
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::UnsupportedTool(name) => write!(f, "unsupported tool '{}'", name),
            ToolError::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
            ToolError::Provider(msg) => write!(f, "Provider failure: {}", msg),
            ToolError::Timeout(limit) => {
                write!(f, "Timed out after {:.1}s", limit.as_secs_f64())
            }
            ToolError::Disallowed(msg) => write!(f, "Disallowed expression: {}", msg),
            ToolError::ExecutionFailed(msg) => write!(f, "{}", msg),
            ToolError::Unavailable(msg) => write!(f, "Tool unavailable: {}", msg),
        }
    }
}

impl Error for ToolError {}

/// Fetch a required string argument, producing the error a model can act on.
pub fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required parameter '{}'", key)))
}
