//! Stage Orchestrator
//!
//! Runs one turn through three non-overlapping phases:
//!
//! 1. **Answers**: every council model answers independently, with tools, through the
//!    [`ParallelDispatcher`].
//! 2. **Peer ranking**: the rankable answers are anonymized and every ranking model critiques
//!    and orders them; positions are averaged per model.
//! 3. **Synthesis**: the chairman reads the answers and the rankings and writes the final
//!    answer.
//!
//! A phase starts only after the previous one has fully resolved. Nothing here returns an
//! error: provider failures become failed results or explicit failure markers, and the
//! resulting [`Turn`] always carries all three stages.
//!
//! # Example
//!
//! ```rust,no_run
//! use llmcouncil::clients::openrouter::OpenRouterClient;
//! use llmcouncil::{CouncilConfig, StageOrchestrator, ToolExecutor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CouncilConfig::from_env()?;
//!     let client = Arc::new(OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?));
//!     let executor = Arc::new(ToolExecutor::from_config(&config));
//!
//!     let council = StageOrchestrator::new(config, client, executor);
//!     let turn = council.run("What is 10000 * 1.07^5?").await;
//!     println!("{}", turn.stage3.response);
//!     Ok(())
//! }
//! ```

use crate::llmcouncil::client_wrapper::{ClientWrapper, Message, Role};
use crate::llmcouncil::config::CouncilConfig;
use crate::llmcouncil::dispatcher::ParallelDispatcher;
use crate::llmcouncil::event::{EventEmitter, StreamEvent};
use crate::llmcouncil::ranking::{
    assign_labels, build_ranking_prompt, calculate_aggregate_rankings, label_to_model,
    parse_ranking_from_text,
};
use crate::llmcouncil::tool_executor::ToolExecutor;
use crate::llmcouncil::tool_protocol::ToolCallRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Text of a failed synthesis.
pub const SYNTHESIS_FAILURE_TEXT: &str = "Error: Unable to generate final synthesis.";

const COUNCIL_SYSTEM_PROMPT: &str = "You are one member of a council of AI models answering the same question independently. \
Give your best complete answer. Use the available tools when current information, a source document, or an exact calculation would make the answer more accurate.";

/// Outcome of one unit of work in any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    /// Usable but incomplete, e.g. the tool iteration cap was reached.
    Degraded,
    Failed,
}

/// One council model's Stage-1 answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Result {
    pub model: String,
    /// Final text; empty when the model failed.
    pub response: String,
    /// Tool calls in the order they were made.
    pub tool_calls: Vec<ToolCallRecord>,
    pub status: ResultStatus,
    pub error: Option<String>,
}

impl Stage1Result {
    pub fn success(model: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response: response.into(),
            tool_calls: Vec::new(),
            status: ResultStatus::Success,
            error: None,
        }
    }

    pub fn failed(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response: String::new(),
            tool_calls: Vec::new(),
            status: ResultStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// One ranking model's critique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub model: String,
    /// The raw critique, ending with the ranking section.
    pub ranking: String,
    /// Labels in ranked order, best first. Empty when nothing could be parsed.
    pub parsed_ranking: Vec<String>,
    pub status: ResultStatus,
    pub error: Option<String>,
}

/// Average position of one council model across all parsed rankings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRanking {
    pub model: String,
    pub average_rank: f64,
    pub rankings_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Result {
    pub rankings: Vec<RankingEntry>,
    /// `"Response A" -> model`, for de-anonymizing the rankings.
    pub label_to_model: BTreeMap<String, String>,
    /// Best first.
    pub aggregate_rankings: Vec<AggregateRanking>,
    pub status: ResultStatus,
    /// Set when rankings are unavailable, or when some rankers failed.
    pub error: Option<String>,
}

impl Stage2Result {
    /// The explicit failure marker used when no ranking could be produced.
    pub fn unavailable(
        error: impl Into<String>,
        rankings: Vec<RankingEntry>,
        label_to_model: BTreeMap<String, String>,
    ) -> Self {
        Self {
            rankings,
            label_to_model,
            aggregate_rankings: Vec::new(),
            status: ResultStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status != ResultStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Result {
    pub model: String,
    pub response: String,
    pub status: ResultStatus,
    pub error: Option<String>,
    /// Whether the chairman saw peer rankings.
    pub rankings_available: bool,
}

/// One query processed through all three stages. Produced here, stored elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub query: String,
    pub stage1: Vec<Stage1Result>,
    pub stage2: Stage2Result,
    pub stage3: Stage3Result,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Prompt for the Stage-3 chairman.
pub fn build_synthesis_prompt(query: &str, stage1: &[Stage1Result], stage2: &Stage2Result) -> String {
    let stage1_text = if stage1.is_empty() {
        "(No council responses were produced.)".to_string()
    } else {
        stage1
            .iter()
            .map(|r| match r.status {
                ResultStatus::Failed => format!(
                    "Model: {}\nResponse: [This model failed to respond: {}]",
                    r.model,
                    r.error.as_deref().unwrap_or("unknown error")
                ),
                ResultStatus::Degraded => format!(
                    "Model: {}\nResponse (incomplete, tool limit reached): {}",
                    r.model, r.response
                ),
                ResultStatus::Success => format!("Model: {}\nResponse: {}", r.model, r.response),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let stage2_text = if stage2.is_available() {
        stage2
            .rankings
            .iter()
            .filter(|e| e.status != ResultStatus::Failed)
            .map(|e| format!("Model: {}\nRanking: {}", e.model, e.ranking))
            .collect::<Vec<_>>()
            .join("\n\n")
    } else {
        format!(
            "Peer rankings were unavailable for this question ({}). Base your synthesis on the individual responses alone.",
            stage2.error.as_deref().unwrap_or("no rankings")
        )
    };

    format!(
        "You are the Chairman of an LLM Council. Multiple AI models have provided responses to a user's question, and then ranked each other's responses.

Original Question: {query}

STAGE 1 - Individual Responses:
{stage1_text}

STAGE 2 - Peer Rankings:
{stage2_text}

Your task as Chairman is to synthesize all of this information into a single, comprehensive, accurate answer to the user's original question. Consider:
- The individual responses and their insights
- The peer rankings and what they reveal about response quality
- Any patterns of agreement or disagreement

Provide a clear, well-reasoned final answer that represents the council's collective wisdom:"
    )
}

pub struct StageOrchestrator {
    config: Arc<CouncilConfig>,
    client: Arc<dyn ClientWrapper>,
    executor: Arc<ToolExecutor>,
    events: EventEmitter,
}

impl StageOrchestrator {
    pub fn new(
        config: CouncilConfig,
        client: Arc<dyn ClientWrapper>,
        executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            executor,
            events: EventEmitter::disabled(),
        }
    }

    /// Emitter used by [`run`](Self::run) and [`run_with_history`](Self::run_with_history).
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    pub async fn run(&self, query: &str) -> Turn {
        self.run_with_emitter(query, &[], &self.events).await
    }

    /// Run a turn with prior user/assistant exchanges prepended to every Stage-1 transcript.
    pub async fn run_with_history(&self, query: &str, history: &[Message]) -> Turn {
        self.run_with_emitter(query, history, &self.events).await
    }

    /// Run a turn reporting progress to `events` instead of the configured emitter.
    pub async fn run_with_emitter(
        &self,
        query: &str,
        history: &[Message],
        events: &EventEmitter,
    ) -> Turn {
        let id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        log::info!(
            "llmcouncil::orchestrator::StageOrchestrator::run(...): turn {} started with {} council model(s)",
            id,
            self.config.council_models.len()
        );

        let stage1 = self.stage1(query, history, events).await;
        let stage2 = self.stage2(query, &stage1, events).await;
        let stage3 = self.stage3(query, &stage1, &stage2, events).await;

        events.emit(StreamEvent::Complete {
            turn_id: id.clone(),
        });
        log::info!(
            "llmcouncil::orchestrator::StageOrchestrator::run(...): turn {} complete",
            id
        );

        Turn {
            id,
            query: query.to_string(),
            stage1,
            stage2,
            stage3,
            started_at,
            completed_at: Utc::now(),
        }
    }

    fn stage1_messages(query: &str, history: &[Message]) -> Vec<Message> {
        let mut messages = vec![Message::system(COUNCIL_SYSTEM_PROMPT)];
        messages.extend(
            history
                .iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                .filter(|m| !m.content.trim().is_empty())
                .map(|m| Message {
                    role: m.role.clone(),
                    content: m.content.clone(),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                    name: None,
                }),
        );
        messages.push(Message::user(query));
        messages
    }

    /// Phase 1: independent answers from every council model.
    pub async fn stage1(
        &self,
        query: &str,
        history: &[Message],
        events: &EventEmitter,
    ) -> Vec<Stage1Result> {
        events.emit(StreamEvent::Stage1Start);

        let dispatcher = ParallelDispatcher::new(
            self.client.clone(),
            self.executor.clone(),
            self.config.clone(),
        )
        .with_events(events.clone());
        let results = dispatcher
            .dispatch(Self::stage1_messages(query, history))
            .await;

        for result in results.iter().filter(|r| r.status == ResultStatus::Failed) {
            events.emit(StreamEvent::Error {
                scope: format!("stage1:{}", result.model),
                message: result.error.clone().unwrap_or_default(),
            });
        }
        events.emit(StreamEvent::Stage1Complete {
            data: results.clone(),
        });
        results
    }

    /// Phase 2: anonymized peer ranking of the Stage-1 answers.
    pub async fn stage2(
        &self,
        query: &str,
        stage1: &[Stage1Result],
        events: &EventEmitter,
    ) -> Stage2Result {
        events.emit(StreamEvent::Stage2Start);

        let labeled = assign_labels(stage1);
        let labels = label_to_model(&labeled);

        let result = if labeled.is_empty() {
            Stage2Result::unavailable("no responses to rank", Vec::new(), labels)
        } else if self.config.ranking_models.is_empty() {
            Stage2Result::unavailable("no ranking models configured", Vec::new(), labels)
        } else {
            let prompt = Arc::new(build_ranking_prompt(query, &labeled));
            let rankings = self.collect_rankings(prompt, events).await;
            let failures = rankings
                .iter()
                .filter(|r| r.status == ResultStatus::Failed)
                .count();

            if failures == rankings.len() {
                Stage2Result::unavailable("all ranking models failed", rankings, labels)
            } else {
                let aggregate_rankings = calculate_aggregate_rankings(&rankings, &labels);
                let (status, error) = if failures > 0 {
                    (
                        ResultStatus::Degraded,
                        Some(format!("{} of {} ranking models failed", failures, rankings.len())),
                    )
                } else {
                    (ResultStatus::Success, None)
                };
                Stage2Result {
                    rankings,
                    label_to_model: labels,
                    aggregate_rankings,
                    status,
                    error,
                }
            }
        };

        if !result.is_available() {
            let message = result.error.clone().unwrap_or_default();
            log::warn!(
                "llmcouncil::orchestrator::StageOrchestrator::stage2(...): rankings unavailable: {}",
                message
            );
            events.emit(StreamEvent::Error {
                scope: "stage2".to_string(),
                message,
            });
        }
        events.emit(StreamEvent::Stage2Complete {
            data: result.clone(),
        });
        result
    }

    /// Query every ranking model concurrently, single shot and without tools.
    async fn collect_rankings(&self, prompt: Arc<String>, events: &EventEmitter) -> Vec<RankingEntry> {
        let mut tasks = Vec::with_capacity(self.config.ranking_models.len());
        for model in &self.config.ranking_models {
            let client = self.client.clone();
            let prompt = prompt.clone();
            let task_model = model.clone();
            tasks.push((
                model.clone(),
                tokio::spawn(async move {
                    client
                        .send_message(&task_model, &[Message::user(prompt.as_str())], None)
                        .await
                }),
            ));
        }

        let mut rankings = Vec::with_capacity(tasks.len());
        for (model, task) in tasks {
            let outcome = match task.await {
                Ok(Ok(response)) => Ok(response.text_content().unwrap_or_default().to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("Task join error: {}", e)),
            };

            match outcome {
                Ok(text) => rankings.push(RankingEntry {
                    parsed_ranking: parse_ranking_from_text(&text),
                    model,
                    ranking: text,
                    status: ResultStatus::Success,
                    error: None,
                }),
                Err(error) => {
                    log::error!(
                        "llmcouncil::orchestrator::StageOrchestrator::stage2(...): ranker {} failed: {}",
                        model,
                        error
                    );
                    events.emit(StreamEvent::Error {
                        scope: format!("stage2:{}", model),
                        message: error.clone(),
                    });
                    rankings.push(RankingEntry {
                        model,
                        ranking: String::new(),
                        parsed_ranking: Vec::new(),
                        status: ResultStatus::Failed,
                        error: Some(error),
                    });
                }
            }
        }
        rankings
    }

    /// Phase 3: the chairman's synthesis.
    pub async fn stage3(
        &self,
        query: &str,
        stage1: &[Stage1Result],
        stage2: &Stage2Result,
        events: &EventEmitter,
    ) -> Stage3Result {
        events.emit(StreamEvent::Stage3Start);

        let chairman = self.config.chairman_model.clone();
        let prompt = build_synthesis_prompt(query, stage1, stage2);
        let outcome = self
            .client
            .send_message(&chairman, &[Message::user(prompt)], None)
            .await;

        let result = match outcome {
            Ok(response) => match response.text_content() {
                Some(text) => Ok(text.to_string()),
                None => Err("chairman returned an empty response".to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        let result = match result {
            Ok(text) => Stage3Result {
                model: chairman,
                response: text,
                status: ResultStatus::Success,
                error: None,
                rankings_available: stage2.is_available(),
            },
            Err(error) => {
                log::error!(
                    "llmcouncil::orchestrator::StageOrchestrator::stage3(...): chairman {} failed: {}",
                    chairman,
                    error
                );
                events.emit(StreamEvent::Error {
                    scope: "stage3".to_string(),
                    message: error.clone(),
                });
                Stage3Result {
                    model: chairman,
                    response: SYNTHESIS_FAILURE_TEXT.to_string(),
                    status: ResultStatus::Failed,
                    error: Some(error),
                    rankings_available: stage2.is_available(),
                }
            }
        };

        events.emit(StreamEvent::Stage3Complete {
            data: result.clone(),
        });
        result
    }
}
