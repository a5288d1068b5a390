// src/llmcouncil/mod.rs

pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod orchestrator;
pub mod ranking;
#[cfg(feature = "server")]
pub mod server;
pub mod tool_executor;
pub mod tool_loop;
pub mod tool_protocol;
pub mod tools;

// Let's explicitly export StageOrchestrator so we don't have to access it via
// llmcouncil::orchestrator::StageOrchestrator and instead as llmcouncil::StageOrchestrator
pub use orchestrator::StageOrchestrator;
