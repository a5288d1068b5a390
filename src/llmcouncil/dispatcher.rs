//! Parallel Dispatcher (Stage 1)
//!
//! Every council model gets its own [`ToolCallingLoop`] in its own `tokio` task. The
//! dispatcher waits for all of them (the Stage-1 barrier) and returns one
//! [`Stage1Result`] per configured model, in council order. Tasks share nothing mutable: each
//! owns its transcript, and results are collected from the join handles after the barrier.

use crate::llmcouncil::client_wrapper::{ClientWrapper, Message};
use crate::llmcouncil::config::CouncilConfig;
use crate::llmcouncil::event::EventEmitter;
use crate::llmcouncil::orchestrator::Stage1Result;
use crate::llmcouncil::tool_executor::ToolExecutor;
use crate::llmcouncil::tool_loop::ToolCallingLoop;
use std::sync::Arc;

pub struct ParallelDispatcher {
    client: Arc<dyn ClientWrapper>,
    executor: Arc<ToolExecutor>,
    config: Arc<CouncilConfig>,
    events: EventEmitter,
}

impl ParallelDispatcher {
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        executor: Arc<ToolExecutor>,
        config: Arc<CouncilConfig>,
    ) -> Self {
        Self {
            client,
            executor,
            config,
            events: EventEmitter::disabled(),
        }
    }

    /// Forward each loop's `tool_call` events to `events`.
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    fn loop_for(&self, model: &str) -> ToolCallingLoop {
        ToolCallingLoop::new(model, self.client.clone(), self.executor.clone())
            .with_max_iterations(self.config.max_tool_iterations)
            .with_tools_enabled(self.config.tools_enabled_for(model))
            .with_events(self.events.clone())
    }

    /// Run every council model over `messages` concurrently and wait for all of them.
    ///
    /// A task that panics yields a failed result for its model; the others are unaffected.
    pub async fn dispatch(&self, messages: Vec<Message>) -> Vec<Stage1Result> {
        let models = &self.config.council_models;
        log::info!(
            "llmcouncil::dispatcher::ParallelDispatcher::dispatch(...): querying {} model(s)",
            models.len()
        );

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            let tool_loop = self.loop_for(model);
            let transcript = messages.clone();
            tasks.push((
                model.clone(),
                tokio::spawn(async move { tool_loop.run(transcript).await }),
            ));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (model, task) in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    log::error!(
                        "llmcouncil::dispatcher::ParallelDispatcher::dispatch(...): task for {} failed: {}",
                        model,
                        e
                    );
                    results.push(Stage1Result::failed(model, format!("Task join error: {}", e)));
                }
            }
        }
        results
    }
}
