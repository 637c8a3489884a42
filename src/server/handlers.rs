use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{client_identity, ApiError, AppState};
use crate::agent::{TurnEvent, TurnRequest};
use crate::metrics::{self, RATE_LIMITED};
use crate::preview::{self, RichPreview};
use crate::sandbox::{ExecuteRequest, ExecuteResponse};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /health, GET /metrics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/chat (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a turn and stream its events
///
/// The rate limit is checked before the body is even validated, so a
/// rejected client never causes model work.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let identity = client_identity(&headers);
    if let Err(e) = state.limiter.check(&identity) {
        RATE_LIMITED.inc();
        warn!(client = %identity, limit = e.limit, "chat request rate limited");
        return Err(e.into());
    }

    let Json(body) = body?;
    let request = TurnRequest::from_json(body)?;
    info!(
        client = %identity,
        messages = request.messages.len(),
        files = request.new_files.len() + request.session_files.len(),
        continuation = request.tool_result.is_some(),
        "chat request accepted"
    );

    let events = state.controller.run_turn(request).map(|event| Ok::<_, Infallible>(sse_event(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

fn sse_event(event: &TurnEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            warn!(error = %e, "failed to encode turn event");
            Event::default().data(r#"{"type":"done"}"#)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/execute
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run approved code in a fresh sandbox
pub async fn execute(
    State(state): State<AppState>,
    request: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = request?;
    debug!(files = request.files.len(), code_bytes = request.code.len(), "execute request");
    let response = state.orchestrator.execute(request).await?;
    Ok(Json(response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/preview
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub name: String,
    /// Base64-encoded file content
    pub content: String,
}

pub async fn preview(
    request: Result<Json<PreviewRequest>, JsonRejection>,
) -> Result<Json<RichPreview>, ApiError> {
    let Json(request) = request?;
    let bytes = STANDARD
        .decode(request.content.trim())
        .map_err(|e| ApiError::BadRequest(format!("content is not valid base64: {}", e)))?;
    let preview = preview::preview_bytes(&request.name, &bytes)?;
    debug!(file = %request.name, rows = preview.shape[0], cols = preview.shape[1], "preview built");
    Ok(Json(preview))
}
