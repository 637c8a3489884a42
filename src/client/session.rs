//! In-process human-in-the-loop chat client
//!
//! Drives [`AgentController`] turns, keeps the conversation's files and
//! runs approved code through the [`Orchestrator`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use serde_json::json;
use tracing::{info, warn};

use super::transcript::{ToolCallRecord, TransitionError, Transcript};
use crate::agent::{AgentController, ErrorKind, Message, ToolResult, TurnEvent, TurnRequest};
use crate::files::{merge_files, FileAttachment, CHEAP_PREVIEW_LINES};
use crate::preview;
use crate::sandbox::{ExecuteRequest, GeneratedFile, InputFile, Orchestrator, SandboxError};
use crate::tools::EXECUTE_PYTHON;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("tool call {index} is not an executable code request")]
    NotExecutable { index: usize },
    #[error("execution failed: {0}")]
    Sandbox(#[from] SandboxError),
}

pub struct ChatSession {
    controller: AgentController,
    orchestrator: Orchestrator,
    /// Finished messages, oldest first
    history: Vec<Message>,
    files: Vec<FileAttachment>,
    transcript: Option<Transcript>,
}

impl ChatSession {
    pub fn new(controller: AgentController, orchestrator: Orchestrator) -> Self {
        Self {
            controller,
            orchestrator,
            history: Vec::new(),
            files: Vec::new(),
            transcript: None,
        }
    }

    pub fn files(&self) -> &[FileAttachment] {
        &self.files
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// The current (or last) assistant message
    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// Send a user message with the files attached to it
    ///
    /// `on_event` sees every event as it streams in.
    pub async fn send<F>(&mut self, text: &str, pending_files: Vec<FileAttachment>, on_event: F)
    where
        F: FnMut(&TurnEvent),
    {
        self.finish_assistant_message();
        self.history.push(Message::user(text));

        let request = TurnRequest {
            messages: self.history.clone(),
            new_files: pending_files.clone(),
            session_files: self.files.clone(),
            tool_result: None,
        };
        merge_files(&mut self.files, pending_files);

        let mut transcript = Transcript::new();
        self.drive(request, &mut transcript, on_event).await;
        self.transcript = Some(transcript);
    }

    /// Approve a pending code request, run it, and continue the turn with
    /// its result in the same assistant message
    pub async fn approve<F>(&mut self, index: usize, on_event: F) -> Result<(), SessionError>
    where
        F: FnMut(&TurnEvent),
    {
        let mut transcript = self
            .transcript
            .take()
            .ok_or(TransitionError::UnknownIndex { index, len: 0 })?;
        let outcome = self.run_approved(&mut transcript, index).await;

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                self.transcript = Some(transcript);
                return Err(e);
            }
        };

        let request = TurnRequest {
            messages: self.continuation_history(&transcript),
            new_files: Vec::new(),
            session_files: self.files.clone(),
            tool_result: Some(output),
        };
        transcript.resume();
        self.drive(request, &mut transcript, on_event).await;
        self.transcript = Some(transcript);
        Ok(())
    }

    async fn run_approved(&mut self, transcript: &mut Transcript, index: usize) -> Result<ToolResult, SessionError> {
        // A record that cannot run must stay pending
        if let Some(record) = transcript.tool_calls.get(index) {
            if executable_code(record).is_none() {
                return Err(SessionError::NotExecutable { index });
            }
        }
        let code = executable_code(transcript.approve(index)?).ok_or(SessionError::NotExecutable { index })?;

        let request = ExecuteRequest {
            code: code.clone(),
            files: self
                .files
                .iter()
                .map(|f| InputFile {
                    name: f.name.clone(),
                    content: STANDARD.encode(&f.content),
                })
                .collect(),
        };

        match self.orchestrator.execute(request).await {
            Ok(output) => {
                let generated: Vec<FileAttachment> = output
                    .generated_files
                    .iter()
                    .filter_map(generated_attachment)
                    .collect();
                info!(index, generated = generated.len(), "approved code executed");
                merge_files(&mut self.files, generated);

                let value = serde_json::to_value(&output).unwrap_or_else(|e| json!({ "error": e.to_string() }));
                transcript.complete(index, value)?;
                Ok(ToolResult { code, output })
            }
            Err(e) => {
                warn!(index, error = %e, "approved code could not run");
                transcript.complete(index, json!({ "error": e.to_string() }))?;
                let kind = match e {
                    SandboxError::Timeout { .. } => ErrorKind::Timeout,
                    _ => ErrorKind::Upstream,
                };
                transcript.apply(&TurnEvent::error(kind, e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Reject a pending code request; the decision is final
    pub fn reject(&mut self, index: usize) -> Result<(), SessionError> {
        let transcript = self
            .transcript
            .as_mut()
            .ok_or(TransitionError::UnknownIndex { index, len: 0 })?;
        transcript.reject(index)?;
        Ok(())
    }

    fn continuation_history(&self, transcript: &Transcript) -> Vec<Message> {
        let mut messages = self.history.clone();
        if !transcript.content.is_empty() {
            messages.push(Message::assistant(transcript.content.clone()));
        }
        messages
    }

    fn finish_assistant_message(&mut self) {
        if let Some(transcript) = self.transcript.take() {
            if !transcript.content.is_empty() {
                self.history.push(Message::assistant(transcript.content));
            }
        }
    }

    async fn drive<F>(&self, request: TurnRequest, transcript: &mut Transcript, mut on_event: F)
    where
        F: FnMut(&TurnEvent),
    {
        let mut events = self.controller.run_turn(request);
        while let Some(event) = events.next().await {
            transcript.apply(&event);
            on_event(&event);
        }
    }
}

/// The code of an `execute_python` call, if the record is one
fn executable_code(record: &ToolCallRecord) -> Option<String> {
    match (record.tool.as_str(), record.args.get("code").and_then(|c| c.as_str())) {
        (EXECUTE_PYTHON, Some(code)) => Some(code.to_string()),
        _ => None,
    }
}

/// Decode a generated file into a session attachment
fn generated_attachment(file: &GeneratedFile) -> Option<FileAttachment> {
    let content = match STANDARD.decode(&file.content) {
        Ok(content) => content,
        Err(e) => {
            warn!(file = %file.name, error = %e, "generated file is not valid base64");
            return None;
        }
    };
    Some(FileAttachment {
        name: file.name.clone(),
        size: content.len(),
        preview: preview::cheap_preview(&content, CHEAP_PREVIEW_LINES),
        rich_preview: file.rich_preview.clone(),
        content,
        is_generated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::AgentConfig;
    use crate::ollama::ChatClient;
    use crate::sandbox::{Sandbox, SandboxProvider};

    struct NoSandbox;

    #[async_trait]
    impl SandboxProvider for NoSandbox {
        async fn create(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
            Err(SandboxError::Provision("not in unit tests".to_string()))
        }
    }

    fn idle_session() -> ChatSession {
        let controller = AgentController::new(Arc::new(ChatClient::new("http://127.0.0.1:9")), AgentConfig::default());
        let orchestrator = Orchestrator::new(Arc::new(NoSandbox), Duration::from_secs(1));
        ChatSession::new(controller, orchestrator)
    }

    #[tokio::test]
    async fn test_non_executable_call_stays_pending() {
        let mut session = idle_session();
        let mut transcript = Transcript::new();
        transcript.apply(&TurnEvent::PendingToolCall {
            tool: "list_files".to_string(),
            args: json!({}),
        });
        transcript.apply(&TurnEvent::Done);
        session.transcript = Some(transcript);

        let result = session.approve(0, |_| {}).await;
        assert!(matches!(result, Err(SessionError::NotExecutable { index: 0 })));
        assert_eq!(session.transcript().unwrap().pending(), vec![0]);

        // still open to a decision
        session.reject(0).unwrap();
    }

    #[test]
    fn test_generated_attachment() {
        let file = GeneratedFile {
            name: "out.csv".to_string(),
            content: STANDARD.encode(b"a\n1\n"),
            size: 4,
            rich_preview: None,
        };
        let attachment = generated_attachment(&file).unwrap();
        assert!(attachment.is_generated);
        assert_eq!(attachment.content, b"a\n1\n");
        assert_eq!(attachment.preview, "a\n1");

        let broken = GeneratedFile { content: "%%".to_string(), ..file };
        assert!(generated_attachment(&broken).is_none());
    }
}
