//! Runs the council HTTP server, configured from the environment.
//!
//! ```text
//! OPENROUTER_API_KEY=... LLMCOUNCIL_ADDR=127.0.0.1:8001 cargo run --features server --bin llmcouncil-server
//! ```

use llmcouncil::clients::openrouter::OpenRouterClient;
use llmcouncil::{server, CouncilConfig, StageOrchestrator, ToolExecutor};
use std::sync::Arc;

const DEFAULT_ADDR: &str = "0.0.0.0:8001";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    llmcouncil::init_logger();

    let config = CouncilConfig::from_env()?;
    let api_key = config.openrouter_api_key.clone().unwrap_or_default();
    if api_key.is_empty() {
        log::warn!("llmcouncil-server: OPENROUTER_API_KEY is not set, every model call will fail");
    }

    let client = Arc::new(
        OpenRouterClient::new(&api_key)
            .with_tool_incapable_models(config.tool_incapable_models.clone()),
    );
    let executor = Arc::new(ToolExecutor::from_config(&config));
    let orchestrator = Arc::new(StageOrchestrator::new(config, client, executor));

    let addr = std::env::var("LLMCOUNCIL_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    server::serve(orchestrator, &addr).await?;
    Ok(())
}
