//! Turn requests and their validation

use serde::{Deserialize, Serialize};

use crate::files::{merge_files, FileAttachment};
use crate::sandbox::ExecuteResponse;

/// Most messages accepted in one request
pub const MAX_MESSAGES: usize = 100;

/// Largest content accepted for a single message (50 KB)
pub const MAX_MESSAGE_BYTES: usize = 50 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Outcome of an approved execution, carried into the follow-up turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub code: String,
    pub output: ExecuteResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    /// Files attached to this turn
    #[serde(default)]
    pub new_files: Vec<FileAttachment>,
    /// Files already part of the conversation
    #[serde(default)]
    pub session_files: Vec<FileAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("too many messages: {count} (max {max})")]
    TooManyMessages { count: usize, max: usize },
    #[error("message {index} is {size} bytes (max {max})")]
    MessageTooLong { index: usize, size: usize, max: usize },
    #[error("malformed request: {0}")]
    Malformed(String),
}

impl TurnRequest {
    /// Decode a request body, mapping shape errors to validation errors
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        let request: Self =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.messages.len() > MAX_MESSAGES {
            return Err(ValidationError::TooManyMessages {
                count: self.messages.len(),
                max: MAX_MESSAGES,
            });
        }
        for (index, message) in self.messages.iter().enumerate() {
            if message.content.len() > MAX_MESSAGE_BYTES {
                return Err(ValidationError::MessageTooLong {
                    index,
                    size: message.content.len(),
                    max: MAX_MESSAGE_BYTES,
                });
            }
        }
        Ok(())
    }

    /// Session files with this turn's files merged in by name
    pub fn all_files(&self) -> Vec<FileAttachment> {
        let mut files = self.session_files.clone();
        merge_files(&mut files, self.new_files.iter().cloned());
        files
    }
}
