//! datavisor - human-in-the-loop data analysis agent
//!
//! A chat agent that explores uploaded tabular files with an Ollama model.
//! Read-only tools run on their own; Python code only runs after a human
//! approves it, each time in a freshly provisioned sandbox.
//!
//! # Modules
//!
//! - `agent` - Turn state machine streaming `TurnEvent`s
//! - `tools` - Tool registry (auto vs. approval tools)
//! - `profiler` - Dataset classification and analysis strategies
//! - `preview` - Rich structural previews of tabular files
//! - `sandbox` - Sandbox orchestration (staging, collection, teardown)
//! - `client` - Transcript reconstruction and an in-process chat session
//! - `ollama` - Streaming Ollama chat client
//! - `server` - axum HTTP surface (SSE chat, execute, preview)
//! - `security` - Per-client rate limiting
//! - `metrics` - Prometheus metrics
//! - `tracing` - Logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use datavisor::{AgentController, ChatClient, TurnRequest};
//!
//! let model = Arc::new(ChatClient::new("http://localhost:11434"));
//! let controller = AgentController::new(model, AgentConfig::default());
//! let mut events = controller.run_turn(request);
//! while let Some(event) = events.next().await { /* ... */ }
//! ```

pub mod agent;
pub mod client;
pub mod config;
pub mod files;
pub mod metrics;
pub mod ollama;
pub mod preview;
pub mod profiler;
pub mod sandbox;
pub mod security;
pub mod server;
pub mod tools;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentController, TurnEvent, TurnRequest};
pub use client::{ChatSession, Transcript};
pub use config::AppConfig;
pub use files::FileAttachment;
pub use ollama::ChatClient;
pub use sandbox::Orchestrator;
