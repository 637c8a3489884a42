//! Agent module: the human-in-the-loop conversation core
//!
//! # Architecture
//!
//! ```text
//! TurnRequest → build_messages() → AgentController::run_turn()
//!                                        │
//!                          Ollama /api/chat (streaming, with tools)
//!                                        │
//!                    ┌───────────────────┼──────────────────────┐
//!                    ▼                   ▼                      ▼
//!              text_delta*       auto tool_call(s)      pending_tool_call
//!                                (loop back to AGENT)   (turn ends, user
//!                                                        approves later)
//!                                        │
//!                                      done
//! ```
//!
//! Approved code never runs inside a turn. The client executes it through
//! [`crate::sandbox::Orchestrator`] and opens a new turn carrying the
//! result as [`ToolResult`].

pub mod context;
pub mod controller;
pub mod events;
pub mod request;

pub use controller::{AgentController, AgentError};
pub use events::{parse_frame, split_frames, ErrorKind, FrameError, TurnEvent};
pub use request::{Message, Role, ToolResult, TurnRequest, ValidationError};
