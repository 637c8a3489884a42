//! Integration tests for the agent system
//!
//! These tests drive full conversations through the public API with a
//! scripted model and an in-memory sandbox: auto tools, approval, rejection,
//! execution and the continuation turn.

mod common;

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::json;

use common::{answer, call, MemoryProvider, ScriptedModel};
use datavisor::agent::{AgentController, ErrorKind, Message, TurnEvent, TurnRequest};
use datavisor::client::{ChatSession, Part, SessionError, ToolStatus, Transcript};
use datavisor::config::AgentConfig;
use datavisor::files::FileAttachment;
use datavisor::ollama::ChatError;
use datavisor::sandbox::{ExecutionError, Orchestrator, RunOutput};

const SALES: &str = "date,revenue,region\n\
2024-01-01,10.5,north\n\
2024-01-02,12.0,south\n\
2024-01-03,9.25,north\n";

fn sales() -> FileAttachment {
    FileAttachment::upload("sales.csv", SALES.as_bytes().to_vec())
}

fn session(model: std::sync::Arc<ScriptedModel>, provider: std::sync::Arc<MemoryProvider>) -> ChatSession {
    let controller = AgentController::new(model, AgentConfig::default());
    let orchestrator = Orchestrator::new(provider, Duration::from_secs(5));
    ChatSession::new(controller, orchestrator)
}

fn printed(stdout: &str) -> RunOutput {
    RunOutput {
        stdout: stdout.to_string(),
        ..RunOutput::default()
    }
}

/// Test that an auto tool result reaches the model before its next call
#[tokio::test]
async fn test_profile_tool_feeds_the_next_call() {
    let model = ScriptedModel::new(vec![
        answer(&[], vec![call("profile_dataset", json!({"file": "sales.csv"}))]),
        answer(&["This is a time series."], vec![]),
    ]);
    let controller = AgentController::new(model.clone(), AgentConfig::default());
    let request = TurnRequest {
        messages: vec![Message::user("What kind of data is this?")],
        new_files: vec![sales()],
        ..Default::default()
    };

    let events: Vec<TurnEvent> = controller.run_turn(request).collect().await;

    match &events[0] {
        TurnEvent::ToolCall { tool, result, .. } => {
            assert_eq!(tool, "profile_dataset");
            assert_eq!(result["profile"]["category"], "time_series");
        }
        other => panic!("expected tool_call, got {:?}", other),
    }
    assert_eq!(events[1], TurnEvent::text("This is a time series."));
    assert_eq!(events.last(), Some(&TurnEvent::Done));

    let calls = model.calls.lock();
    assert_eq!(calls.len(), 2);
    let last = calls[1].last().unwrap();
    assert_eq!(last.role, "tool");
    assert!(last.content.contains("time_series"));
}

/// Test that the first prompt describes the attached file
#[tokio::test]
async fn test_files_are_described_to_the_model() {
    let model = ScriptedModel::new(vec![answer(&["ok"], vec![])]);
    let controller = AgentController::new(model.clone(), AgentConfig::default());
    let request = TurnRequest {
        messages: vec![Message::user("hi")],
        new_files: vec![sales()],
        ..Default::default()
    };
    let _: Vec<TurnEvent> = controller.run_turn(request).collect().await;

    let calls = model.calls.lock();
    let prompt: String = calls[0].iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
    assert!(prompt.contains("sales.csv"));
    assert!(prompt.contains("Dataset type: time_series"));
}

/// Test the full approve → execute → continue flow
#[tokio::test]
async fn test_approved_code_runs_and_continues_same_message() {
    let model = ScriptedModel::new(vec![
        answer(
            &["Let me compute that. "],
            vec![call("execute_python", json!({"code": "df.to_csv('summary.csv')"}))],
        ),
        answer(&["Total revenue is 31.75."], vec![]),
    ]);
    let provider = MemoryProvider::new(
        printed("31.75\n"),
        vec![("summary.csv".to_string(), b"region,revenue\nnorth,19.75\n".to_vec())],
    );
    let mut session = session(model.clone(), provider.clone());

    let mut first = Vec::new();
    session
        .send("What is the total revenue?", vec![sales()], |e| first.push(e.clone()))
        .await;

    assert!(matches!(first[first.len() - 2], TurnEvent::PendingToolCall { .. }));
    assert_eq!(first.last(), Some(&TurnEvent::Done));
    assert_eq!(session.transcript().unwrap().pending(), vec![0]);
    assert_eq!(provider.created(), 0);

    let mut second = Vec::new();
    session.approve(0, |e| second.push(e.clone())).await.unwrap();

    let transcript: &Transcript = session.transcript().unwrap();
    assert_eq!(transcript.content, "Let me compute that. Total revenue is 31.75.");
    assert_eq!(transcript.text(), transcript.content);
    assert_eq!(transcript.tool_calls[0].status, ToolStatus::Completed);
    assert_eq!(transcript.tool_calls[0].result.as_ref().unwrap()["stdout"], "31.75\n");
    assert!(!transcript.streaming);

    assert_eq!(provider.created(), 1);
    assert_eq!(provider.kills(), 1);

    let names: Vec<&str> = session.files().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["sales.csv", "summary.csv"]);
    assert!(session.files()[1].is_generated);

    let calls = model.calls.lock();
    assert_eq!(calls.len(), 2);
    let context: String = calls[1].iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
    assert!(context.contains("The user approved and ran this code"));
    assert!(context.contains("31.75"));
    assert!(context.contains("summary.csv"));
}

/// Test that a rejected request never reaches the sandbox or the model
#[tokio::test]
async fn test_rejected_code_is_terminal() {
    let model = ScriptedModel::new(vec![answer(
        &["I will run this."],
        vec![call("execute_python", json!({"code": "import os"}))],
    )]);
    let provider = MemoryProvider::new(RunOutput::default(), Vec::new());
    let mut session = session(model.clone(), provider.clone());

    session.send("clean up", Vec::new(), |_| {}).await;
    session.reject(0).unwrap();

    let transcript = session.transcript().unwrap();
    assert_eq!(transcript.tool_calls[0].status, ToolStatus::Rejected);
    assert!(matches!(
        session.approve(0, |_| {}).await,
        Err(SessionError::Transition(_))
    ));
    assert_eq!(provider.created(), 0);
    assert_eq!(model.call_count(), 1);
}

/// Test that a provisioning failure completes the call with an error and
/// does not start a continuation turn
#[tokio::test]
async fn test_provision_failure_is_reported() {
    let model = ScriptedModel::new(vec![answer(
        &[],
        vec![call("execute_python", json!({"code": "print(1)"}))],
    )]);
    let provider = MemoryProvider::unavailable();
    let mut session = session(model.clone(), provider);

    session.send("run it", Vec::new(), |_| {}).await;
    let result = session.approve(0, |_| {}).await;

    assert!(matches!(result, Err(SessionError::Sandbox(ref e)) if e.is_provision()));
    let record = &session.transcript().unwrap().tool_calls[0];
    assert_eq!(record.status, ToolStatus::Completed);
    assert!(record.result.as_ref().unwrap()["error"].is_string());
    assert!(matches!(
        session.transcript().unwrap().parts.last(),
        Some(Part::Error { kind: ErrorKind::Upstream, .. })
    ));
    assert_eq!(model.call_count(), 1);
}

/// Test that an error raised by the user's code is summarized for the model
#[tokio::test]
async fn test_execution_error_is_summarized() {
    let model = ScriptedModel::new(vec![
        answer(&[], vec![call("execute_python", json!({"code": "1/0"}))]),
        answer(&["Division by zero."], vec![]),
    ]);
    let provider = MemoryProvider::new(
        RunOutput {
            error: Some(ExecutionError {
                name: "ZeroDivisionError".to_string(),
                value: "division by zero".to_string(),
                traceback: String::new(),
            }),
            ..RunOutput::default()
        },
        vec![("ignored.csv".to_string(), b"a\n1\n".to_vec())],
    );
    let mut session = session(model.clone(), provider);

    session.send("divide", Vec::new(), |_| {}).await;
    session.approve(0, |_| {}).await.unwrap();

    assert!(session.files().is_empty());
    let calls = model.calls.lock();
    let context: String = calls[1].iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
    assert!(context.contains("ZeroDivisionError: division by zero"));
}

/// Test that an upstream failure keeps the partial text and ends with done
#[tokio::test]
async fn test_upstream_failure_keeps_partial_text() {
    let model = ScriptedModel::new(vec![vec![
        Ok(datavisor::ollama::ModelChunk::Token("Partial".to_string())),
        Err(ChatError::Model("model not found".to_string())),
    ]]);
    let provider = MemoryProvider::new(RunOutput::default(), Vec::new());
    let mut session = session(model, provider);

    let mut events = Vec::new();
    session.send("hi", Vec::new(), |e| events.push(e.clone())).await;

    assert!(matches!(
        &events[events.len() - 2],
        TurnEvent::Error { kind: ErrorKind::Upstream, .. }
    ));
    assert_eq!(events.last(), Some(&TurnEvent::Done));
    assert_eq!(session.transcript().unwrap().content, "Partial");
}

/// Test that the next user message sees the previous assistant answer
#[tokio::test]
async fn test_history_carries_previous_answer() {
    let model = ScriptedModel::new(vec![answer(&["First."], vec![]), answer(&["Second."], vec![])]);
    let provider = MemoryProvider::new(RunOutput::default(), Vec::new());
    let mut session = session(model.clone(), provider);

    session.send("one", Vec::new(), |_| {}).await;
    session.send("two", Vec::new(), |_| {}).await;

    let roles: Vec<_> = session.history().iter().map(|m| (m.role, m.content.as_str())).collect();
    assert_eq!(roles.len(), 3);
    assert_eq!(roles[1].1, "First.");

    let calls = model.calls.lock();
    assert!(calls[1].iter().any(|m| m.role == "assistant" && m.content == "First."));
}
