//! Shared test doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use llmcouncil::client_wrapper::{ClientWrapper, Message, ModelResponse, ProviderError, Role};
use llmcouncil::tool_protocol::{ToolCallRequest, ToolDefinition};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_RANKING: &str =
    "Response A is solid. Response B is thinner.\n\nFINAL RANKING:\n1. Response A\n2. Response B";
pub const DEFAULT_SYNTHESIS: &str = "The council agrees.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Answer,
    Rank,
    Synthesize,
}

fn phase_of(messages: &[Message]) -> Phase {
    match messages.first() {
        Some(m) if m.role == Role::System => Phase::Answer,
        Some(m) if m.content.starts_with("You are the Chairman") => Phase::Synthesize,
        _ => Phase::Rank,
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub model: String,
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub had_tools: bool,
    pub started: Instant,
    pub finished: Instant,
}

/// A model client answering from per-model scripts.
///
/// Stage-1 calls pop the model's script (falling back to `"answer from <model>"`), ranking
/// calls return the model's ranking reply and synthesis calls the chairman reply.
pub struct ScriptedClient {
    answers: Mutex<HashMap<String, VecDeque<Result<ModelResponse, ProviderError>>>>,
    rankings: HashMap<String, Result<String, ProviderError>>,
    synthesis: Result<String, ProviderError>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            rankings: HashMap::new(),
            synthesis: Ok(DEFAULT_SYNTHESIS.to_string()),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn answers(self, model: &str, script: Vec<Result<ModelResponse, ProviderError>>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(model.to_string(), script.into_iter().collect());
        self
    }

    pub fn ranking(mut self, model: &str, reply: Result<String, ProviderError>) -> Self {
        self.rankings.insert(model.to_string(), reply);
        self
    }

    pub fn synthesis(mut self, reply: Result<String, ProviderError>) -> Self {
        self.synthesis = reply;
        self
    }

    /// Delay every Stage-1 answer of `model`.
    pub fn delay(mut self, model: &str, millis: u64) -> Self {
        self.delays
            .insert(model.to_string(), Duration::from_millis(millis));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, model: &str, phase: Phase) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.model == model && c.phase == phase)
            .collect()
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    async fn send_message(
        &self,
        model: &str,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, ProviderError> {
        let started = Instant::now();
        let phase = phase_of(messages);

        let reply = match phase {
            Phase::Answer => {
                if let Some(delay) = self.delays.get(model) {
                    tokio::time::sleep(*delay).await;
                }
                let scripted = self
                    .answers
                    .lock()
                    .unwrap()
                    .get_mut(model)
                    .and_then(|queue| queue.pop_front());
                scripted.unwrap_or_else(|| Ok(ModelResponse::text(format!("answer from {}", model))))
            }
            Phase::Rank => self
                .rankings
                .get(model)
                .cloned()
                .unwrap_or_else(|| Ok(DEFAULT_RANKING.to_string()))
                .map(ModelResponse::text),
            Phase::Synthesize => self.synthesis.clone().map(ModelResponse::text),
        };

        self.calls.lock().unwrap().push(Call {
            model: model.to_string(),
            phase,
            messages: messages.to_vec(),
            had_tools: tools.is_some(),
            started,
            finished: Instant::now(),
        });
        reply
    }
}

pub fn calculator_call(id: &str, expression: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, "calculator", json!({ "expression": expression }))
}

pub fn wants_tools(calls: Vec<ToolCallRequest>) -> Result<ModelResponse, ProviderError> {
    Ok(ModelResponse::with_tool_calls(None, calls))
}

pub fn says(text: &str) -> Result<ModelResponse, ProviderError> {
    Ok(ModelResponse::text(text))
}

pub fn http_error(status: u16) -> ProviderError {
    ProviderError::Status {
        status,
        body: "upstream error".to_string(),
    }
}
