//! HTTP surface
//!
//! # Routes
//!
//! ```text
//! POST /api/chat     TurnRequest ──► SSE stream of TurnEvent (done last)
//! POST /api/execute  ExecuteRequest ──► ExecuteResponse
//! POST /api/preview  {name, content} ──► RichPreview
//! GET  /health
//! GET  /metrics      Prometheus text format
//! ```
//!
//! Only `/api/chat` is rate limited; it is the route that starts model work.

mod error;
mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::AgentController;
use crate::sandbox::Orchestrator;
use crate::security::RateLimiter;

pub use error::ApiError;

/// Request bodies carry base64 file content
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Identity used when no forwarding header is present
pub const ANONYMOUS: &str = "anonymous";

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    pub controller: AgentController,
    pub orchestrator: Orchestrator,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(controller: AgentController, orchestrator: Orchestrator, limiter: Arc<RateLimiter>) -> Self {
        Self {
            controller,
            orchestrator,
            limiter,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/chat", post(handlers::chat))
        .route("/api/execute", post(handlers::execute))
        .route("/api/preview", post(handlers::preview))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// First `X-Forwarded-For` entry, else `X-Real-IP`, else `anonymous`
pub fn client_identity(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(ANONYMOUS)
        .to_string()
}
