//! Terminal chat client
//!
//! Talks to Ollama and the sandbox service directly through [`ChatSession`].
//!
//! Commands:
//!   /attach <path>   attach a file to the next message
//!   /files           list the conversation's files
//!   /quit            exit

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

use datavisor::agent::{AgentController, TurnEvent};
use datavisor::client::ChatSession;
use datavisor::config::AppConfig;
use datavisor::files::FileAttachment;
use datavisor::ollama::ChatClient;
use datavisor::sandbox::{Orchestrator, RemoteSandboxProvider};

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let model = Arc::new(ChatClient::new(config.ollama_url.clone()));
    let controller = AgentController::new(model, config.agent.clone());
    let provider = Arc::new(RemoteSandboxProvider::new(&config.sandbox));
    let orchestrator = Orchestrator::new(provider, config.sandbox.execution_timeout);
    let mut session = ChatSession::new(controller, orchestrator);

    println!("datavisor chat ({}). /attach <path>, /files, /quit", config.agent.model);

    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Vec<FileAttachment> = Vec::new();

    loop {
        prompt("> ");
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(path) = line.strip_prefix("/attach ") {
            match attach(path.trim()).await {
                Ok(file) => {
                    println!("attached {} ({} bytes)", file.name, file.size);
                    pending.push(file);
                }
                Err(e) => println!("cannot attach {}: {}", path.trim(), e),
            }
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/files" => {
                for file in session.files() {
                    println!("  {} ({} bytes, {})", file.name, file.size, file.origin());
                }
                continue;
            }
            _ => {}
        }

        session.send(line, std::mem::take(&mut pending), print_event).await;
        println!();
        review_pending(&mut session, &mut input).await?;
    }

    Ok(())
}

/// Ask about each pending code request until none is left
async fn review_pending(session: &mut ChatSession, input: &mut Input) -> std::io::Result<()> {
    loop {
        let Some(index) = session.transcript().and_then(|t| t.pending().first().copied()) else {
            return Ok(());
        };
        if let Some(record) = session.transcript().and_then(|t| t.tool_calls.get(index)) {
            let code = record.args.get("code").and_then(|c| c.as_str()).unwrap_or_default();
            println!("\n--- code ---------------------------------------------");
            println!("{}", code);
            println!("------------------------------------------------------");
        }
        prompt("Run this code? [y/N] ");

        let answer = input.next_line().await?.unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("y") {
            if let Err(e) = session.approve(index, print_event).await {
                println!("execution failed: {}", e);
                return Ok(());
            }
            println!();
        } else {
            if let Err(e) = session.reject(index) {
                println!("{}", e);
            }
            println!("rejected");
            return Ok(());
        }
    }
}

fn print_event(event: &TurnEvent) {
    match event {
        TurnEvent::TextDelta { content } => {
            print!("{}", content);
            let _ = std::io::stdout().flush();
        }
        TurnEvent::ToolCall { tool, .. } => println!("\n[{}]", tool),
        TurnEvent::PendingToolCall { tool, .. } => println!("\n[{} awaiting approval]", tool),
        TurnEvent::Error { kind, message } => println!("\n[error: {}] {}", kind.as_str(), message),
        TurnEvent::Done => {}
    }
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn attach(path: &str) -> std::io::Result<FileAttachment> {
    let content = tokio::fs::read(path).await?;
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    Ok(FileAttachment::upload(name, content))
}
