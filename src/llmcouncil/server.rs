//! HTTP front end for the council, built on axum.
//!
//! | Route | |
//! |---|---|
//! | `GET /` | health check |
//! | `POST /api/council` | run a turn, answer with the finished [`Turn`](crate::orchestrator::Turn) as JSON |
//! | `POST /api/council/stream` | run a turn, answer with its [`StreamEvent`](crate::event::StreamEvent)s as Server-Sent Events |
//!
//! Both council routes take `{"query": "...", "history": [...]}`; `history` is optional.
//! A client that disconnects from the stream does not cancel the turn.
//!
//! Only available when the "server" feature is enabled.

use crate::llmcouncil::client_wrapper::Message;
use crate::llmcouncil::event::EventMultiplexer;
use crate::llmcouncil::orchestrator::StageOrchestrator;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Body of both council routes.
#[derive(Debug, Clone, Deserialize)]
pub struct CouncilRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<Message>,
}

fn reject_blank(request: &CouncilRequest) -> Option<Response> {
    if request.query.trim().is_empty() {
        Some(
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "query must not be empty"})),
            )
                .into_response(),
        )
    } else {
        None
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "LLM Council API"}))
}

async fn council(
    State(orchestrator): State<Arc<StageOrchestrator>>,
    Json(request): Json<CouncilRequest>,
) -> Response {
    if let Some(rejection) = reject_blank(&request) {
        return rejection;
    }
    let turn = orchestrator
        .run_with_history(&request.query, &request.history)
        .await;
    (StatusCode::OK, Json(turn)).into_response()
}

async fn council_stream(
    State(orchestrator): State<Arc<StageOrchestrator>>,
    Json(request): Json<CouncilRequest>,
) -> Response {
    if let Some(rejection) = reject_blank(&request) {
        return rejection;
    }
    log::info!("llmcouncil::server::council_stream(...): streaming a new turn");

    let (events, _turn) =
        EventMultiplexer::start_with_history(orchestrator, request.query, request.history)
            .into_parts();
    let frames = events.map(|event| Ok::<Event, Infallible>(Event::default().data(event.to_json())));
    Sse::new(frames)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// The council's routes, sharing one orchestrator.
pub fn router(orchestrator: Arc<StageOrchestrator>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/council", post(council))
        .route("/api/council/stream", post(council_stream))
        .with_state(orchestrator)
}

/// Bind `addr` and serve [`router`] until the process stops.
pub async fn serve(orchestrator: Arc<StageOrchestrator>, addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!(
        "llmcouncil::server::serve(...): listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, router(orchestrator)).await
}
