// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP ingress.
//!
//! `POST /agent/run` validates the request, builds the request-scoped
//! context, launches the orchestrator on its own task, and answers with the
//! SSE stream fed by the request's Printer.  The connection closes when the
//! printer's transport sender is dropped after the final event.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use maestro_config::Config;
use maestro_core::{AgentContext, Orchestrator, OutputStyle, RunRequest};
use maestro_model::ChatModel;
use maestro_sse::{Printer, PrinterOptions};
use maestro_tools::ToolCollection;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn ChatModel>,
    /// Boot-time tool prototype; each request takes an isolated view.
    pub tools: Arc<ToolCollection>,
    pub http: reqwest::Client,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/run", post(run_agent))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

async fn health() -> &'static str {
    "ok"
}

async fn run_agent(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Response {
    if let Err(msg) = req.validate() {
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }
    debug!(request_id = %req.request_id, mode = ?req.mode, "accepted agent run");

    let (out_tx, out_rx) = mpsc::channel::<String>(256);
    let cancel = CancellationToken::new();
    let printer = Printer::spawn(
        out_tx,
        PrinterOptions {
            heartbeat: Duration::from_secs(state.config.sse.heartbeat_seconds),
            deadline: Duration::from_secs(state.config.sse.request_deadline_secs),
        },
        cancel,
    );

    let ctx = Arc::new(AgentContext::new(
        req.request_id,
        req.session_id,
        req.query,
        OutputStyle::from_option(req.output_style.as_deref()),
        req.stream,
        printer,
        Arc::new(state.tools.request_view()),
        Arc::clone(&state.config),
        state.http.clone(),
    ));

    // One worker per request drives the orchestrator; the response stream
    // below outlives this handler.
    let orchestrator = Orchestrator::new(Arc::clone(&state.llm));
    let mode = req.mode;
    tokio::spawn(async move {
        orchestrator.run(&ctx, mode).await;
    });

    let body = Body::from_stream(ReceiverStream::new(out_rx).map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .expect("static response parts are valid")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use maestro_model::mock::ScriptedMockModel;

    use super::*;

    fn test_state() -> AppState {
        AppState {
            config: Arc::new(Config::default()),
            llm: Arc::new(ScriptedMockModel::always_text("ok")),
            tools: Arc::new(ToolCollection::new()),
            http: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn health_returns_ok() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_any_context_is_built() {
        let state = Arc::new(test_state());
        let req = RunRequest {
            request_id: String::new(),
            session_id: "s".into(),
            query: "q".into(),
            mode: maestro_core::Mode::React,
            output_style: None,
            stream: false,
        };
        let resp = run_agent(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_request_answers_with_event_stream() {
        let state = Arc::new(test_state());
        let req = RunRequest {
            request_id: "r1".into(),
            session_id: "s1".into(),
            query: "What is 2+2?".into(),
            mode: maestro_core::Mode::React,
            output_style: None,
            stream: false,
        };
        let resp = run_agent(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
    }
}
