//! Turn events and their server-sent-event framing
//!
//! A turn emits any number of `text_delta` / `tool_call` events, optionally
//! one `pending_tool_call` or one `error`, and always ends with exactly one
//! `done`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse classification of a turn failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Upstream,
    Execution,
    ResourceLimit,
    IterationLimit,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Execution => "execution",
            ErrorKind::ResourceLimit => "resource_limit",
            ErrorKind::IterationLimit => "iteration_limit",
            ErrorKind::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Incremental assistant text
    TextDelta { content: String },
    /// An auto-executed tool and its result
    ToolCall { tool: String, args: Value, result: Value },
    /// A tool waiting for human approval; the turn ends right after
    PendingToolCall { tool: String, args: Value },
    Error { kind: ErrorKind, message: String },
    Done,
}

impl TurnEvent {
    pub fn text(content: impl Into<String>) -> Self {
        TurnEvent::TextDelta {
            content: content.into(),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        TurnEvent::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TurnEvent::Done)
    }

    /// `data: {json}\n\n`
    pub fn to_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"done"}"#.to_string());
        format!("data: {}\n\n", json)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame does not start with 'data:'")]
    MissingPrefix,
    #[error("invalid event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Parse one SSE frame back into an event
pub fn parse_frame(frame: &str) -> Result<TurnEvent, FrameError> {
    let payload = frame
        .trim_end_matches('\n')
        .strip_prefix("data:")
        .ok_or(FrameError::MissingPrefix)?;
    Ok(serde_json::from_str(payload.trim_start())?)
}

/// Split a buffered SSE body into complete frames
///
/// Returns the parsed events and whatever trailing bytes did not yet form a
/// complete frame.
pub fn split_frames(buffer: &str) -> (Vec<Result<TurnEvent, FrameError>>, &str) {
    let mut events = Vec::new();
    let mut rest = buffer;
    while let Some(end) = rest.find("\n\n") {
        let frame = &rest[..end];
        rest = &rest[end + 2..];
        // Comment lines (keep-alives) start with ':'
        if frame.trim().is_empty() || frame.starts_with(':') {
            continue;
        }
        events.push(parse_frame(frame));
    }
    (events, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(TurnEvent::text("hi")).unwrap(),
            json!({"type": "text_delta", "content": "hi"})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::Done).unwrap(),
            json!({"type": "done"})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::error(ErrorKind::IterationLimit, "too many")).unwrap(),
            json!({"type": "error", "kind": "iteration_limit", "message": "too many"})
        );
        assert_eq!(
            serde_json::to_value(TurnEvent::PendingToolCall {
                tool: "execute_python".to_string(),
                args: json!({"code": "1"}),
            })
            .unwrap(),
            json!({"type": "pending_tool_call", "tool": "execute_python", "args": {"code": "1"}})
        );
    }

    #[test]
    fn test_frame_round_trip() {
        let event = TurnEvent::ToolCall {
            tool: "list_files".to_string(),
            args: json!({}),
            result: json!({"files": []}),
        };
        let frame = event.to_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
        assert_eq!(parse_frame(&frame).unwrap(), event);
    }

    #[test]
    fn test_parse_frame_errors() {
        assert!(matches!(parse_frame("event: x"), Err(FrameError::MissingPrefix)));
        assert!(matches!(parse_frame("data: {nope}"), Err(FrameError::Payload(_))));
    }

    #[test]
    fn test_split_frames_keeps_partial_tail() {
        let body = "data: {\"type\":\"text_delta\",\"content\":\"a\"}\n\n:keep-alive\n\ndata: {\"type\":\"do";
        let (events, rest) = split_frames(body);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &TurnEvent::text("a"));
        assert_eq!(rest, "data: {\"type\":\"do");
    }
}
