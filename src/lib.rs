//! # llmcouncil
//!
//! llmcouncil asks a council of Large Language Models the same question and turns their
//! answers into one. A turn runs in three stages:
//!
//! 1. **Answers**: every council model answers independently and concurrently, calling tools
//!    (web search, calculator, Wikipedia, page fetch) as it sees fit, inside a bounded
//!    [`tool_loop::ToolCallingLoop`].
//! 2. **Peer ranking**: the answers are anonymized as "Response A", "Response B", … and every
//!    ranking model critiques and orders them. Positions are averaged per model.
//! 3. **Synthesis**: a chairman model reads the answers and the rankings and writes the final
//!    answer.
//!
//! Progress is reported as an ordered stream of [`event::StreamEvent`]s that maps directly
//! onto Server-Sent Events.
//!
//! ## Core Concepts
//!
//! ### Running a turn
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llmcouncil::clients::openrouter::OpenRouterClient;
//! use llmcouncil::{CouncilConfig, StageOrchestrator, ToolExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     llmcouncil::init_logger();
//!     let config = CouncilConfig::from_env()?;
//!     let client = Arc::new(OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?));
//!     let executor = Arc::new(ToolExecutor::from_config(&config));
//!
//!     let council = StageOrchestrator::new(config, client, executor);
//!     let turn = council.run("Who won the 2022 World Cup, and by how many goals?").await;
//!
//!     for answer in &turn.stage1 {
//!         println!("{} ({:?}): {} tool call(s)", answer.model, answer.status, answer.tool_calls.len());
//!     }
//!     for rank in &turn.stage2.aggregate_rankings {
//!         println!("{}: average position {}", rank.model, rank.average_rank);
//!     }
//!     println!("Chairman: {}", turn.stage3.response);
//!     Ok(())
//! }
//! ```
//!
//! ### Streaming progress
//!
//! [`event::EventMultiplexer`] runs a turn in the background and hands back its event stream.
//! Each event renders as one SSE frame:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llmcouncil::clients::openrouter::OpenRouterClient;
//! use llmcouncil::event::EventMultiplexer;
//! use llmcouncil::{CouncilConfig, StageOrchestrator, ToolExecutor};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CouncilConfig::default();
//! let client = Arc::new(OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?));
//! let executor = Arc::new(ToolExecutor::from_config(&config));
//! let council = Arc::new(StageOrchestrator::new(config, client, executor));
//!
//! let mut turn = EventMultiplexer::start(council, "What is 2 ** 10?");
//! while let Some(event) = turn.next().await {
//!     print!("{}", event.to_sse_frame());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Providers
//!
//! Models are reached through the [`ClientWrapper`] trait; [`clients::openrouter`] implements
//! it for OpenRouter. Tools sit behind their own provider traits
//! ([`tools::SearchProvider`], [`tools::EncyclopediaProvider`], [`tools::PageFetcher`]) and
//! the [`ToolExecutor`] falls back along each chain when a provider fails.
//!
//! ### HTTP server
//!
//! With the `server` feature, `server::router` exposes the council over HTTP (JSON and SSE)
//! and the `llmcouncil-server` binary runs it.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding llmcouncil can opt in to `RUST_LOG` driven diagnostics without
/// choosing a logging backend upfront.
///
/// ```rust
/// llmcouncil::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `llmcouncil` module.
pub mod llmcouncil;

// Re-exporting key items for easier external access.
pub use llmcouncil::client_wrapper;
pub use llmcouncil::client_wrapper::{ClientWrapper, Message, ModelResponse, ProviderError, Role};
pub use llmcouncil::clients;
pub use llmcouncil::config;
pub use llmcouncil::config::{ConfigError, CouncilConfig, ToolLimits};
pub use llmcouncil::dispatcher;
pub use llmcouncil::dispatcher::ParallelDispatcher;
pub use llmcouncil::event;
pub use llmcouncil::event::{EventEmitter, EventMultiplexer, EventStream, StreamEvent, TurnStream};
pub use llmcouncil::orchestrator;
pub use llmcouncil::orchestrator::{
    AggregateRanking, RankingEntry, ResultStatus, Stage1Result, Stage2Result, Stage3Result,
    StageOrchestrator, Turn,
};
pub use llmcouncil::ranking;
#[cfg(feature = "server")]
pub use llmcouncil::server;
pub use llmcouncil::tool_executor;
pub use llmcouncil::tool_executor::ToolExecutor;
pub use llmcouncil::tool_loop;
pub use llmcouncil::tool_loop::ToolCallingLoop;
pub use llmcouncil::tool_protocol;
pub use llmcouncil::tool_protocol::{
    ToolCallRecord, ToolCallRequest, ToolDefinition, ToolError, ToolOutcome,
};
pub use llmcouncil::tools;
