//! Client-side reconstruction of turns
//!
//! [`Transcript`] folds a stream of [`crate::agent::TurnEvent`]s back into
//! an assistant message; [`ChatSession`] is a complete in-process client
//! built on it (used by the `datavisor-chat` binary).

pub mod session;
pub mod transcript;

pub use session::{ChatSession, SessionError};
pub use transcript::{Part, ToolCallRecord, ToolStatus, Transcript, TransitionError};
