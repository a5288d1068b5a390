//! Tool-Calling Loop
//!
//! One loop per model per turn. The loop alternates between querying the model and running
//! the tools it asks for until the model answers without tool requests or the iteration cap
//! is reached:
//!
//! ```text
//! Querying ──(tool requests, budget left)──▶ AwaitingTools ──(all resolved)──▶ Querying
//!    │                                                                           │
//!    ├──(no tool requests)──────────────────────────────▶ Done (success)        │
//!    ├──(tool requests, cap reached)────────────────────▶ Aborted (degraded) ◀──┘
//!    └──(model call failed)─────────────────────────────▶ Done (failed)
//! ```
//!
//! Transitions live in [`LoopState::next`], a pure function; [`ToolCallingLoop::run`] only
//! performs the I/O each state asks for. Failures never escape the loop: they become a
//! failed [`Stage1Result`] that keeps whatever tool records were gathered.

use crate::llmcouncil::client_wrapper::{ClientWrapper, Message, ModelResponse, ProviderError};
use crate::llmcouncil::config::DEFAULT_MAX_TOOL_ITERATIONS;
use crate::llmcouncil::event::{EventEmitter, StreamEvent};
use crate::llmcouncil::orchestrator::{ResultStatus, Stage1Result};
use crate::llmcouncil::tool_executor::ToolExecutor;
use crate::llmcouncil::tool_protocol::{ToolCallRecord, ToolCallRequest};
use futures_util::future::join_all;
use std::sync::Arc;

/// Final text of a degraded answer when the model never produced any text.
pub const MAX_ITERATIONS_NOTICE: &str =
    "Maximum tool calling iterations reached. Please try rephrasing your question.";

/// Tool-result text for requests beyond the record budget.
pub const SKIPPED_TOOL_RESULT: &str = "skipped: tool budget exhausted";

/// State of one model's loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// The model is about to be queried. `iteration` counts completed tool rounds.
    Querying { iteration: usize },
    /// The model asked for tools; they must all resolve before the next query.
    AwaitingTools {
        iteration: usize,
        content: Option<String>,
        requests: Vec<ToolCallRequest>,
    },
    /// Terminal: a final answer (success) or a model failure (failed).
    Done {
        status: ResultStatus,
        text: Option<String>,
        error: Option<String>,
    },
    /// Terminal: the cap was hit while the model still wanted tools.
    Aborted { text: Option<String> },
}

/// Inputs to a transition.
#[derive(Debug)]
pub enum LoopEvent {
    ModelResponded(ModelResponse),
    ModelFailed(ProviderError),
    ToolsResolved,
}

/// What the transition function needs to know about the loop's budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopBudget {
    pub max_iterations: usize,
    /// Tool records gathered so far.
    pub records: usize,
    /// `false` for single-shot queries; tool requests are then ignored.
    pub tools_allowed: bool,
}

impl LoopBudget {
    /// How many more tool calls may be recorded.
    pub fn remaining_records(&self) -> usize {
        self.max_iterations.saturating_sub(self.records)
    }
}

impl LoopState {
    pub fn initial() -> Self {
        LoopState::Querying { iteration: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Done { .. } | LoopState::Aborted { .. })
    }

    /// The single transition function of the loop.
    pub fn next(self, event: LoopEvent, budget: &LoopBudget) -> LoopState {
        match (self, event) {
            (LoopState::Querying { .. }, LoopEvent::ModelFailed(err)) => LoopState::Done {
                status: ResultStatus::Failed,
                text: None,
                error: Some(err.to_string()),
            },
            (LoopState::Querying { iteration }, LoopEvent::ModelResponded(response)) => {
                let text = response.text_content().map(String::from);
                if response.tool_calls.is_empty() || !budget.tools_allowed {
                    LoopState::Done {
                        status: ResultStatus::Success,
                        text,
                        error: None,
                    }
                } else if iteration < budget.max_iterations && budget.remaining_records() > 0 {
                    LoopState::AwaitingTools {
                        iteration,
                        content: response.content,
                        requests: response.tool_calls,
                    }
                } else {
                    LoopState::Aborted { text }
                }
            }
            (LoopState::AwaitingTools { iteration, .. }, LoopEvent::ToolsResolved) => {
                LoopState::Querying {
                    iteration: iteration + 1,
                }
            }
            (state, event) if state.is_terminal() => {
                log::debug!(
                    "llmcouncil::tool_loop::LoopState::next(...): ignoring {:?} in terminal state",
                    event
                );
                state
            }
            (state, event) => LoopState::Done {
                status: ResultStatus::Failed,
                text: None,
                error: Some(format!("unexpected {:?} while in {:?}", event, state)),
            },
        }
    }
}

/// Drives one model through the tool-calling loop.
pub struct ToolCallingLoop {
    model: String,
    client: Arc<dyn ClientWrapper>,
    executor: Arc<ToolExecutor>,
    max_iterations: usize,
    tools_enabled: bool,
    events: EventEmitter,
}

impl ToolCallingLoop {
    pub fn new(
        model: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
        executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            model: model.into(),
            client,
            executor,
            max_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            tools_enabled: true,
            events: EventEmitter::disabled(),
        }
    }

    /// Cap on tool rounds, which also caps the number of recorded tool calls.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// `false` turns the loop into a single-shot query without tool definitions.
    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn tools_allowed(&self) -> bool {
        self.tools_enabled && self.max_iterations > 0 && self.client.supports_tools(&self.model)
    }

    /// Run the loop over `messages` (system/context, history, user query) to completion.
    pub async fn run(&self, messages: Vec<Message>) -> Stage1Result {
        let tools_allowed = self.tools_allowed();
        let tools = if tools_allowed {
            Some(self.executor.definitions())
        } else {
            None
        };

        let mut transcript = messages;
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut last_text: Option<String> = None;
        let mut state = LoopState::initial();

        log::info!(
            "llmcouncil::tool_loop::ToolCallingLoop::run({}): starting (tools: {})",
            self.model,
            tools_allowed
        );

        while !state.is_terminal() {
            let budget = LoopBudget {
                max_iterations: self.max_iterations,
                records: records.len(),
                tools_allowed,
            };

            let event = match &state {
                LoopState::Querying { iteration } => {
                    log::debug!(
                        "llmcouncil::tool_loop::ToolCallingLoop::run({}): query #{}",
                        self.model,
                        iteration + 1
                    );
                    match self.client.send_message(&self.model, &transcript, tools).await {
                        Ok(response) => {
                            if let Some(text) = response.text_content() {
                                last_text = Some(text.to_string());
                            }
                            LoopEvent::ModelResponded(response)
                        }
                        Err(err) => LoopEvent::ModelFailed(err),
                    }
                }
                LoopState::AwaitingTools {
                    content, requests, ..
                } => {
                    transcript.push(Message::assistant_with_tool_calls(
                        content.clone().unwrap_or_default(),
                        requests.clone(),
                    ));
                    let executed = self
                        .execute_round(requests, budget.remaining_records())
                        .await;
                    for (request, record) in requests.iter().zip(executed) {
                        match record {
                            Some(record) => {
                                transcript.push(Message::tool_result(
                                    &request.id,
                                    &request.name,
                                    record.result.clone(),
                                ));
                                records.push(record);
                            }
                            None => transcript.push(Message::tool_result(
                                &request.id,
                                &request.name,
                                SKIPPED_TOOL_RESULT,
                            )),
                        }
                    }
                    LoopEvent::ToolsResolved
                }
                LoopState::Done { .. } | LoopState::Aborted { .. } => break,
            };

            state = state.next(event, &budget);
        }

        self.finish(state, records, last_text)
    }

    /// Run the first `allowance` requests concurrently; the rest are skipped (`None`).
    /// Results come back in request order.
    async fn execute_round(
        &self,
        requests: &[ToolCallRequest],
        allowance: usize,
    ) -> Vec<Option<ToolCallRecord>> {
        if requests.len() > allowance {
            log::warn!(
                "llmcouncil::tool_loop::ToolCallingLoop::execute_round({}): skipping {} of {} tool call(s), budget exhausted",
                self.model,
                requests.len() - allowance,
                requests.len()
            );
        }

        let futures = requests.iter().enumerate().map(|(idx, request)| async move {
            if idx >= allowance {
                return None;
            }
            let record = self.executor.execute_request(request).await;
            log::info!(
                "llmcouncil::tool_loop::ToolCallingLoop::execute_round({}): {} finished in {}ms{}",
                self.model,
                record.name,
                record.duration_ms,
                if record.error.is_some() { " with an error" } else { "" }
            );
            self.events.emit(StreamEvent::ToolCall {
                model: self.model.clone(),
                record: record.clone(),
            });
            Some(record)
        });

        join_all(futures).await
    }

    fn finish(
        &self,
        state: LoopState,
        records: Vec<ToolCallRecord>,
        last_text: Option<String>,
    ) -> Stage1Result {
        match state {
            LoopState::Done {
                status: ResultStatus::Failed,
                error,
                ..
            } => {
                let error = error.unwrap_or_else(|| "unknown model failure".to_string());
                log::error!(
                    "llmcouncil::tool_loop::ToolCallingLoop::run({}): model call failed after {} tool call(s): {}",
                    self.model,
                    records.len(),
                    error
                );
                Stage1Result {
                    model: self.model.clone(),
                    response: String::new(),
                    tool_calls: records,
                    status: ResultStatus::Failed,
                    error: Some(error),
                }
            }
            LoopState::Done { status, text, error } => Stage1Result {
                model: self.model.clone(),
                response: text.or(last_text).unwrap_or_default(),
                tool_calls: records,
                status,
                error,
            },
            LoopState::Aborted { text } => {
                log::warn!(
                    "llmcouncil::tool_loop::ToolCallingLoop::run({}): iteration cap of {} reached",
                    self.model,
                    self.max_iterations
                );
                Stage1Result {
                    model: self.model.clone(),
                    response: text
                        .or(last_text)
                        .unwrap_or_else(|| MAX_ITERATIONS_NOTICE.to_string()),
                    tool_calls: records,
                    status: ResultStatus::Degraded,
                    error: None,
                }
            }
            other => Stage1Result::failed(
                self.model.clone(),
                format!("loop stopped in a non-terminal state: {:?}", other),
            ),
        }
    }
}
