//! Configuration for a council.
//!
//! Provides the [`CouncilConfig`] struct: which models answer, which models rank, who
//! synthesizes, and the tool limits every model runs under. Users construct this manually or
//! read it from the process environment with [`CouncilConfig::from_env`]; no config-file
//! parsing dependencies are required.
//!
//! # Example
//!
//! ```rust
//! use llmcouncil::CouncilConfig;
//!
//! let config = CouncilConfig {
//!     council_models: vec!["openai/gpt-5.2".into(), "x-ai/grok-4".into()],
//!     max_tool_iterations: 3,
//!     ..CouncilConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! assert_eq!(config.ranking_models.len(), 3);
//! ```

use std::error::Error;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_COUNCIL_MODELS: [&str; 3] = [
    "openai/gpt-5.2",
    "google/gemini-3-pro-preview",
    "anthropic/claude-sonnet-4.5",
];
pub const DEFAULT_CHAIRMAN_MODEL: &str = "openai/gpt-5.2";
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 5;

/// Hard limits applied by the tool executor to every tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolLimits {
    /// Maximum number of entries a search-style tool returns.
    pub max_results: usize,
    /// Maximum length, in characters, of any tool output (truncation marker included).
    pub max_output_chars: usize,
    /// Wall-clock budget for a single provider attempt.
    pub attempt_timeout: Duration,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_output_chars: 4000,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-only configuration for one council. Shared by every stage of a turn.
#[derive(Debug, Clone)]
pub struct CouncilConfig {
    /// Models queried independently in Stage 1, in presentation order.
    pub council_models: Vec<String>,
    /// Models asked to rank the anonymized Stage-1 answers in Stage 2.
    pub ranking_models: Vec<String>,
    /// The Stage-3 synthesizer.
    pub chairman_model: String,
    /// Global switch for tool use in Stage 1.
    pub enable_tools: bool,
    /// Per-model cap on tool-calling rounds (and on recorded tool calls).
    pub max_tool_iterations: usize,
    /// Models that must be queried without tool definitions.
    pub tool_incapable_models: Vec<String>,
    pub limits: ToolLimits,
    /// Credential for the OpenRouter model client.
    pub openrouter_api_key: Option<String>,
    /// Credential for the primary search provider. Without it search falls back at once.
    pub tavily_api_key: Option<String>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        let council: Vec<String> = DEFAULT_COUNCIL_MODELS.iter().map(|m| m.to_string()).collect();
        Self {
            ranking_models: council.clone(),
            council_models: council,
            chairman_model: DEFAULT_CHAIRMAN_MODEL.to_string(),
            enable_tools: true,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            tool_incapable_models: Vec::new(),
            limits: ToolLimits::default(),
            openrouter_api_key: None,
            tavily_api_key: None,
        }
    }
}

impl CouncilConfig {
    /// Build a configuration from process environment variables on top of the defaults.
    ///
    /// Recognized variables: `OPENROUTER_API_KEY`, `TAVILY_API_KEY`, `COUNCIL_MODELS`,
    /// `RANKING_MODELS`, `CHAIRMAN_MODEL`, `ENABLE_TOOLS`, `MAX_TOOL_ITERATIONS` and
    /// `TOOL_INCAPABLE_MODELS`. Model lists are comma separated. When `COUNCIL_MODELS` is
    /// set and `RANKING_MODELS` is not, the council ranks itself.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        config.openrouter_api_key = read("OPENROUTER_API_KEY");
        config.tavily_api_key = read("TAVILY_API_KEY");

        if let Some(models) = read("COUNCIL_MODELS") {
            config.council_models = parse_model_list(&models);
            config.ranking_models = config.council_models.clone();
        }
        if let Some(models) = read("RANKING_MODELS") {
            config.ranking_models = parse_model_list(&models);
        }
        if let Some(chairman) = read("CHAIRMAN_MODEL") {
            config.chairman_model = chairman;
        }
        if let Some(flag) = read("ENABLE_TOOLS") {
            config.enable_tools = parse_flag(&flag).ok_or(ConfigError::InvalidValue {
                key: "ENABLE_TOOLS".to_string(),
                value: flag.clone(),
            })?;
        }
        if let Some(cap) = read("MAX_TOOL_ITERATIONS") {
            config.max_tool_iterations =
                cap.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                    key: "MAX_TOOL_ITERATIONS".to_string(),
                    value: cap.clone(),
                })?;
        }
        if let Some(models) = read("TOOL_INCAPABLE_MODELS") {
            config.tool_incapable_models = parse_model_list(&models);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants a turn relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.council_models.is_empty() {
            return Err(ConfigError::EmptyCouncil);
        }
        if self.chairman_model.trim().is_empty() {
            return Err(ConfigError::MissingChairman);
        }
        if self.max_tool_iterations == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_tool_iterations must be at least 1".to_string(),
            ));
        }
        if self.limits.max_results == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_results must be at least 1".to_string(),
            ));
        }
        if self.limits.max_output_chars < 64 {
            return Err(ConfigError::InvalidLimit(
                "max_output_chars must leave room for the truncation marker".to_string(),
            ));
        }
        if self.limits.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidLimit(
                "attempt_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `model` may be sent tool definitions.
    pub fn tools_enabled_for(&self, model: &str) -> bool {
        self.enable_tools && !self.tool_incapable_models.iter().any(|m| m == model)
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Errors raised while building or validating a [`CouncilConfig`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    InvalidValue { key: String, value: String },
    EmptyCouncil,
    MissingChairman,
    InvalidLimit(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
            ConfigError::EmptyCouncil => write!(f, "At least one council model is required"),
            ConfigError::MissingChairman => write!(f, "A chairman model is required"),
            ConfigError::InvalidLimit(msg) => write!(f, "Invalid limit: {}", msg),
        }
    }
}

impl Error for ConfigError {}
