//! datavisor HTTP server
//!
//! ```text
//! browser ──► /api/chat ──► AgentController ──► Ollama
//!         ──► /api/execute ──► Orchestrator ──► sandbox service
//! ```

use std::sync::Arc;

use datavisor::agent::AgentController;
use datavisor::config::AppConfig;
use datavisor::ollama::ChatClient;
use datavisor::sandbox::{Orchestrator, RemoteSandboxProvider};
use datavisor::security::RateLimiter;
use datavisor::server::{self, AppState};
use datavisor::tracing::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = AppConfig::from_env()?;
    init_tracing("datavisor", config.otlp_endpoint.as_deref())?;

    let model = Arc::new(ChatClient::new(config.ollama_url.clone()));
    let controller = AgentController::new(model, config.agent.clone());

    let provider = Arc::new(RemoteSandboxProvider::new(&config.sandbox));
    let orchestrator = Orchestrator::new(provider, config.sandbox.execution_timeout);

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));

    let app = server::router(AppState::new(controller, orchestrator, limiter));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        model = %config.agent.model,
        ollama = %config.ollama_url,
        sandbox = %config.sandbox.base_url,
        "datavisor listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_tracing();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
