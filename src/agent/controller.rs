//! Agent Controller - the AGENT / TOOLS state machine behind one turn
//!
//! ```text
//!            ┌─────────────────────────────────────┐
//!            ▼                                     │
//!   ──► AGENT (stream model) ──► tool calls?       │
//!            │                     │               │
//!            │ none                │ auto only     │
//!            ▼                     ▼               │
//!           END ◄── approval ── TOOLS (execute, ───┘
//!                   required     append results)
//! ```
//!
//! The turn is exposed as a stream of [`TurnEvent`]s. Dropping the stream
//! cancels the turn at its next suspension point.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout_at;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::context::build_messages;
use super::events::{ErrorKind, TurnEvent};
use super::request::TurnRequest;
use crate::config::AgentConfig;
use crate::metrics::{LLM_CALL_DURATION, TOOL_CALLS, TURNS, TURN_ITERATIONS};
use crate::ollama::{ChatError, ChatMessage, ChatModel, ModelChunk};
use crate::tools::{tool_schemas, ToolCall, ToolContext, ToolParseError};

/// Error type for a failed turn
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("maximum iterations ({max}) reached without a final answer")]
    IterationLimit { max: usize },
    #[error("LLM call failed: {0}")]
    Upstream(#[from] ChatError),
    #[error("turn exceeded {secs}s")]
    Timeout { secs: u64 },
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::IterationLimit { .. } => ErrorKind::IterationLimit,
            AgentError::Upstream(_) => ErrorKind::Upstream,
            AgentError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            AgentError::IterationLimit { .. } => "iteration_limit",
            AgentError::Upstream(_) => "upstream_error",
            AgentError::Timeout { .. } => "timeout",
        }
    }
}

/// How a turn that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// The model answered without tool calls
    Completed,
    /// An approval-required call was surfaced
    PendingApproval,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::PendingApproval => "pending_approval",
        }
    }
}

/// One tool call of a model turn, as requested and as parsed
struct RequestedCall {
    name: String,
    args: Value,
    parsed: Result<ToolCall, ToolParseError>,
}

/// Runs turns against a chat model
#[derive(Clone)]
pub struct AgentController {
    model: Arc<dyn ChatModel>,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `model` - LLM completion service
    /// * `config` - Agent configuration (model name, iteration ceiling, turn budget)
    pub fn new(model: Arc<dyn ChatModel>, config: AgentConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one turn, streaming its events
    ///
    /// The stream always ends with exactly one [`TurnEvent::Done`], also
    /// after an error. A `pending_tool_call` is always followed directly by
    /// that `done`.
    pub fn run_turn(&self, request: TurnRequest) -> BoxStream<'static, TurnEvent> {
        let model = self.model.clone();
        let config = self.config.clone();
        let turn_id = Uuid::now_v7().to_string();

        let events = async_stream::stream! {
            info!(turn_id = %turn_id, model = %config.model, messages = request.messages.len(), "turn started");
            let deadline = tokio::time::Instant::now() + config.turn_timeout;
            let files = request.all_files();
            let ctx = ToolContext { files: &files };
            let tools = tool_schemas();
            let mut messages = build_messages(&request, &config);
            let mut iteration = 0usize;

            let result: Result<Outcome, AgentError> = 'turn: loop {
                if iteration == config.max_iterations {
                    break 'turn Err(AgentError::IterationLimit { max: config.max_iterations });
                }
                iteration += 1;

                // AGENT: stream one model turn
                let llm_span = info_span!(
                    "llm_call",
                    turn_id = %turn_id,
                    iteration,
                    otel.name = "llm_call"
                );
                let started = Instant::now();
                let call = model
                    .chat_stream(&config.model, messages.clone(), tools.clone())
                    .instrument(llm_span.clone());
                let mut chunks = match timeout_at(deadline, call).await {
                    Err(_) => break 'turn Err(timeout_error(&config)),
                    Ok(Err(e)) => break 'turn Err(e.into()),
                    Ok(Ok(chunks)) => chunks,
                };

                let completion = loop {
                    let next = chunks.next().instrument(llm_span.clone());
                    match timeout_at(deadline, next).await {
                        Err(_) => break 'turn Err(timeout_error(&config)),
                        Ok(None) => break 'turn Err(ChatError::Incomplete.into()),
                        Ok(Some(Err(e))) => break 'turn Err(e.into()),
                        Ok(Some(Ok(ModelChunk::Token(token)))) => {
                            if !token.is_empty() {
                                yield TurnEvent::text(token);
                            }
                        }
                        Ok(Some(Ok(ModelChunk::Done(completion)))) => break completion,
                    }
                };
                let elapsed = started.elapsed().as_secs_f64();
                LLM_CALL_DURATION.with_label_values(&[&config.model]).observe(elapsed);
                debug!(
                    turn_id = %turn_id,
                    iteration,
                    duration_ms = elapsed * 1000.0,
                    tool_calls = completion.tool_calls.len(),
                    "LLM call completed"
                );

                messages.push(ChatMessage::assistant_with_tools(
                    completion.content,
                    completion.tool_calls.clone(),
                ));
                if completion.tool_calls.is_empty() {
                    break 'turn Ok(Outcome::Completed);
                }

                let calls: Vec<RequestedCall> = completion
                    .tool_calls
                    .into_iter()
                    .map(|call| {
                        let parsed = ToolCall::parse(&call.function.name, &call.function.arguments);
                        RequestedCall {
                            name: call.function.name,
                            args: call.function.arguments,
                            parsed,
                        }
                    })
                    .collect();

                // Any approval-required call ends the turn and nothing else runs
                let pending = calls
                    .iter()
                    .find_map(|c| c.parsed.as_ref().ok().filter(|t| t.requires_approval()));
                if let Some(pending) = pending {
                    if calls.len() > 1 {
                        warn!(
                            turn_id = %turn_id,
                            skipped = calls.len() - 1,
                            "approval required; co-requested tool calls not executed"
                        );
                    }
                    TOOL_CALLS.with_label_values(&[pending.name(), "approval"]).inc();
                    yield TurnEvent::PendingToolCall {
                        tool: pending.name().to_string(),
                        args: pending.args(),
                    };
                    break 'turn Ok(Outcome::PendingApproval);
                }

                // TOOLS: run every call in order, results go back to the model
                for call in calls {
                    let (tool, args, result) = match call.parsed {
                        Ok(ToolCall::Auto(tool)) => {
                            TOOL_CALLS.with_label_values(&[tool.name(), "auto"]).inc();
                            let result = tool
                                .execute(&ctx)
                                .unwrap_or_else(|e| json!({ "error": e.to_string() }));
                            (tool.name().to_string(), tool.args(), result)
                        }
                        // Ruled out above
                        Ok(ToolCall::Approval(_)) => continue,
                        Err(e) => {
                            debug!(turn_id = %turn_id, tool = %call.name, error = %e, "invalid tool call");
                            TOOL_CALLS.with_label_values(&["invalid", "auto"]).inc();
                            (call.name, call.args, json!({ "error": e.to_string() }))
                        }
                    };
                    messages.push(ChatMessage::tool(result.to_string()));
                    yield TurnEvent::ToolCall { tool, args, result };
                }
            };

            TURN_ITERATIONS.observe(iteration as f64);
            match result {
                Ok(outcome) => {
                    TURNS.with_label_values(&[outcome.as_str()]).inc();
                    info!(turn_id = %turn_id, iterations = iteration, outcome = outcome.as_str(), "turn finished");
                }
                Err(e) => {
                    TURNS.with_label_values(&[e.outcome()]).inc();
                    warn!(turn_id = %turn_id, iterations = iteration, error = %e, "turn failed");
                    yield TurnEvent::error(e.kind(), e.to_string());
                }
            }
            yield TurnEvent::Done;
        };

        events.boxed()
    }
}

fn timeout_error(config: &AgentConfig) -> AgentError {
    AgentError::Timeout {
        secs: config.turn_timeout.as_secs(),
    }
}
