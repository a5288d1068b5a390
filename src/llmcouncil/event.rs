//! Turn progress events.
//!
//! A turn reports its progress as an ordered sequence of [`StreamEvent`]s on a single
//! unbounded channel:
//!
//! ```text
//! stage1_start
//!   ├─ tool_call (model, record)        zero or more, as tools finish
//!   └─ error (scope, message)           one per failed council model
//! stage1_complete (results)
//! stage2_start
//!   └─ error (scope, message)           when rankers fail
//! stage2_complete (result)
//! stage3_start
//!   └─ error (scope, message)           when the chairman fails
//! stage3_complete (result)
//! complete (turn id)
//! ```
//!
//! The subscriber is a side channel. [`EventEmitter::emit`] never blocks and ignores a
//! closed receiver, so a client that disconnects mid-turn never cancels the orchestration.
//! There is no replay: events sent before a subscriber exists are not kept anywhere else.
//!
//! # Example
//!
//! ```rust
//! use llmcouncil::event::{EventMultiplexer, StreamEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (emitter, mut stream) = EventMultiplexer::channel();
//! emitter.emit(StreamEvent::Stage2Start);
//! drop(emitter);
//!
//! let event = stream.next().await.unwrap();
//! assert_eq!(event.to_sse_frame(), "data: {\"type\":\"stage2_start\"}\n\n");
//! assert!(stream.next().await.is_none());
//! # }
//! ```

use crate::llmcouncil::client_wrapper::Message;
use crate::llmcouncil::orchestrator::{
    Stage1Result, Stage2Result, Stage3Result, StageOrchestrator, Turn,
};
use crate::llmcouncil::tool_protocol::ToolCallRecord;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One progress event of a turn, serialized with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Stage1Start,
    /// A Stage-1 model finished one tool call.
    ToolCall {
        model: String,
        record: ToolCallRecord,
    },
    /// One result per council model, in council order.
    Stage1Complete {
        data: Vec<Stage1Result>,
    },
    Stage2Start,
    Stage2Complete {
        data: Stage2Result,
    },
    Stage3Start,
    Stage3Complete {
        data: Stage3Result,
    },
    /// A model-level failure. `scope` names the stage, and the model when there is one
    /// (`stage1:<model>`, `stage2:<model>`, `stage3`).
    Error {
        scope: String,
        message: String,
    },
    Complete {
        turn_id: String,
    },
}

impl StreamEvent {
    /// The value of the `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Stage1Start => "stage1_start",
            StreamEvent::ToolCall { .. } => "tool_call",
            StreamEvent::Stage1Complete { .. } => "stage1_complete",
            StreamEvent::Stage2Start => "stage2_start",
            StreamEvent::Stage2Complete { .. } => "stage2_complete",
            StreamEvent::Stage3Start => "stage3_start",
            StreamEvent::Stage3Complete { .. } => "stage3_complete",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Complete { .. } => "complete",
        }
    }

    /// The event as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": "error",
                "scope": "stream",
                "message": format!("failed to serialize {} event: {}", self.event_type(), e),
            })
            .to_string()
        })
    }

    /// The event as a Server-Sent-Events frame: `data: {json}\n\n`.
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// Sending half of a turn's event channel. Cheap to clone; a default emitter drops
/// everything.
#[derive(Clone, Default)]
pub struct EventEmitter {
    sender: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl EventEmitter {
    pub fn new(sender: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// An emitter with no subscriber.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue an event. A dropped subscriber is not an error.
    pub fn emit(&self, event: StreamEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                log::trace!("llmcouncil::event::EventEmitter::emit(...): subscriber is gone");
            }
        }
    }
}

/// Receiving half of a turn's event channel.
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<StreamEvent>,
}

impl EventStream {
    /// The next event, or `None` once every emitter is gone and the queue is drained.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.receiver.poll_recv(cx)
    }
}

/// A running turn: its event stream plus a handle on the finished [`Turn`].
///
/// Dropping a `TurnStream` detaches the turn; it still runs to completion.
pub struct TurnStream {
    events: EventStream,
    handle: JoinHandle<Option<Turn>>,
}

impl TurnStream {
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.next().await
    }

    /// Wait for the turn itself. `None` when the orchestration task died.
    pub async fn turn(self) -> Option<Turn> {
        self.handle.await.ok().flatten()
    }

    /// Split into the event stream and the turn handle.
    pub fn into_parts(self) -> (EventStream, JoinHandle<Option<Turn>>) {
        (self.events, self.handle)
    }
}

/// Wires a [`StageOrchestrator`] to an event stream.
pub struct EventMultiplexer;

impl EventMultiplexer {
    /// A connected emitter/stream pair.
    pub fn channel() -> (EventEmitter, EventStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (EventEmitter::new(sender), EventStream { receiver })
    }

    /// Start a turn in the background and stream its events.
    pub fn start(orchestrator: Arc<StageOrchestrator>, query: impl Into<String>) -> TurnStream {
        Self::start_with_history(orchestrator, query, Vec::new())
    }

    /// Like [`start`](Self::start), with prior user/assistant exchanges prepended to every
    /// Stage-1 transcript.
    pub fn start_with_history(
        orchestrator: Arc<StageOrchestrator>,
        query: impl Into<String>,
        history: Vec<Message>,
    ) -> TurnStream {
        let query = query.into();
        let (emitter, events) = Self::channel();

        let handle = tokio::spawn(async move {
            let turn_emitter = emitter.clone();
            let task = tokio::spawn(async move {
                orchestrator
                    .run_with_emitter(&query, &history, &turn_emitter)
                    .await
            });
            match task.await {
                Ok(turn) => Some(turn),
                Err(e) => {
                    log::error!(
                        "llmcouncil::event::EventMultiplexer::start(...): orchestration task failed: {}",
                        e
                    );
                    emitter.emit(StreamEvent::Error {
                        scope: "turn".to_string(),
                        message: format!("orchestration task failed: {}", e),
                    });
                    None
                }
            }
        });

        TurnStream { events, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_and_struct_variants_carry_type_tag() {
        let complete = StreamEvent::Complete {
            turn_id: "t-1".into(),
        };
        assert_eq!(complete.to_json(), r#"{"type":"complete","turn_id":"t-1"}"#);

        let error = StreamEvent::Error {
            scope: "stage2".into(),
            message: "boom".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["scope"], "stage2");
    }

    #[tokio::test]
    async fn emitting_after_subscriber_drop_is_silent() {
        let (emitter, stream) = EventMultiplexer::channel();
        drop(stream);
        emitter.emit(StreamEvent::Stage1Start);
        assert!(emitter.is_enabled());
        EventEmitter::disabled().emit(StreamEvent::Stage1Start);
    }

    #[tokio::test]
    async fn stream_yields_events_in_send_order() {
        let (emitter, mut stream) = EventMultiplexer::channel();
        emitter.emit(StreamEvent::Stage1Start);
        emitter.emit(StreamEvent::Stage2Start);
        emitter.emit(StreamEvent::Stage3Start);
        drop(emitter);

        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            seen.push(event.event_type());
        }
        assert_eq!(seen, vec!["stage1_start", "stage2_start", "stage3_start"]);
    }
}
