//! Reconstruction of an assistant message from turn events
//!
//! The flattened `content` always equals the concatenation of the text
//! parts, and the N-th tool-call part refers to the N-th entry of
//! `tool_calls`.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::agent::{ErrorKind, TurnEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Approved => "approved",
            ToolStatus::Completed => "completed",
            ToolStatus::Rejected => "rejected",
        }
    }

    /// `pending → approved → completed`, `pending → rejected`
    pub fn can_become(&self, next: ToolStatus) -> bool {
        matches!(
            (self, next),
            (ToolStatus::Pending, ToolStatus::Approved)
                | (ToolStatus::Pending, ToolStatus::Rejected)
                | (ToolStatus::Approved, ToolStatus::Completed)
        )
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: Value,
    pub status: ToolStatus,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    /// Position in [`Transcript::tool_calls`]
    ToolCall { index: usize },
    /// Note left by a failed turn; not part of the message content
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("no tool call at index {index} ({len} recorded)")]
    UnknownIndex { index: usize, len: usize },
    #[error("tool call {index} cannot go from {from} to {to}")]
    Illegal {
        index: usize,
        from: ToolStatus,
        to: ToolStatus,
    },
}

/// The in-flight (or last) assistant message of a conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    pub content: String,
    pub parts: Vec<Part>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub streaming: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            streaming: true,
            ..Self::default()
        }
    }

    /// Mark the message as streaming again for a continuation turn
    pub fn resume(&mut self) {
        self.streaming = true;
    }

    pub fn apply(&mut self, event: &TurnEvent) {
        match event {
            TurnEvent::TextDelta { content } => self.push_text(content),
            TurnEvent::ToolCall { tool, args, result } => self.push_call(ToolCallRecord {
                tool: tool.clone(),
                args: args.clone(),
                status: ToolStatus::Completed,
                result: Some(result.clone()),
            }),
            TurnEvent::PendingToolCall { tool, args } => self.push_call(ToolCallRecord {
                tool: tool.clone(),
                args: args.clone(),
                status: ToolStatus::Pending,
                result: None,
            }),
            TurnEvent::Error { kind, message } => {
                self.parts.push(Part::Error {
                    kind: *kind,
                    message: message.clone(),
                });
                self.streaming = false;
            }
            TurnEvent::Done => self.streaming = false,
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.content.push_str(text);
        match self.parts.last_mut() {
            Some(Part::Text { text: last }) => last.push_str(text),
            _ => self.parts.push(Part::Text {
                text: text.to_string(),
            }),
        }
    }

    fn push_call(&mut self, record: ToolCallRecord) {
        self.parts.push(Part::ToolCall {
            index: self.tool_calls.len(),
        });
        self.tool_calls.push(record);
    }

    fn transition(&mut self, index: usize, to: ToolStatus) -> Result<&mut ToolCallRecord, TransitionError> {
        let len = self.tool_calls.len();
        let record = self
            .tool_calls
            .get_mut(index)
            .ok_or(TransitionError::UnknownIndex { index, len })?;
        if !record.status.can_become(to) {
            return Err(TransitionError::Illegal {
                index,
                from: record.status,
                to,
            });
        }
        record.status = to;
        Ok(record)
    }

    pub fn approve(&mut self, index: usize) -> Result<&ToolCallRecord, TransitionError> {
        let record = self.transition(index, ToolStatus::Approved)?;
        Ok(&*record)
    }

    pub fn reject(&mut self, index: usize) -> Result<(), TransitionError> {
        self.transition(index, ToolStatus::Rejected).map(|_| ())
    }

    pub fn complete(&mut self, index: usize, result: Value) -> Result<(), TransitionError> {
        let record = self.transition(index, ToolStatus::Completed)?;
        record.result = Some(result);
        Ok(())
    }

    /// Indices of calls waiting for a decision
    pub fn pending(&self) -> Vec<usize> {
        self.tool_calls
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ToolStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Concatenated text parts; always equal to `content`
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}
