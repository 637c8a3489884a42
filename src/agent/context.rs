//! Message context builder
//!
//! Builds the LLM message list for one turn:
//!
//! 1. system directives (role, fresh-environment rule, file conventions);
//! 2. a description of every file in the conversation;
//! 3. the prior messages, in order;
//! 4. the summary of an approved execution, when the turn follows one.

use std::fmt::Write as _;

use super::request::{Role, TurnRequest};
use crate::config::AgentConfig;
use crate::files::FileAttachment;
use crate::ollama::ChatMessage;
use crate::preview;
use crate::profiler;
use crate::sandbox::{ExecuteResponse, MOUNT_DIR};

/// Longest stdout/stderr excerpt included in an execution summary
pub const MAX_OUTPUT_CHARS: usize = 4_000;

/// Built-in directives used when no custom system prompt is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a data analysis assistant. You help the user understand the files they share by profiling them and by writing Python code.

Tools:
- list_files, profile_dataset and suggest_analysis run immediately.
- execute_python runs only after the user approves the exact code you propose.

Every execute_python call runs in a brand-new sandbox. Nothing survives between executions: no variables, no imports, no files you created earlier unless they were returned to the conversation. Each program must be self-contained: import every library it uses and load every file it reads.

Guidelines:
- Propose one complete program per execute_python call.
- Print the results you want to discuss; keep printed output short.
- When an execution fails, read the error and propose a corrected program.
- When the task is complete, answer in plain text."#;

fn file_directives() -> String {
    format!(
        "Files are available in {dir}/ under their original names (for example {dir}/data.csv). \
         Save figures with matplotlib (plt.savefig or plt.show) and write any file you want to hand \
         back to the user into {dir}/. New files in that directory are returned to the conversation.",
        dir = MOUNT_DIR
    )
}

/// Assemble the message list for one AGENT step
pub fn build_messages(request: &TurnRequest, config: &AgentConfig) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 3);

    let directives = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    messages.push(ChatMessage::system(format!("{}\n\n{}", directives, file_directives())));

    let files = request.all_files();
    if !files.is_empty() {
        messages.push(ChatMessage::system(describe_files(&files)));
    }

    for message in &request.messages {
        messages.push(match message.role {
            Role::User => ChatMessage::user(message.content.clone()),
            Role::Assistant => ChatMessage::assistant(message.content.clone()),
            Role::System => ChatMessage::system(message.content.clone()),
        });
    }

    if let Some(tool_result) = &request.tool_result {
        messages.push(ChatMessage::system(format!(
            "The user approved and ran this code:\n```python\n{}\n```\n\n{}",
            tool_result.code,
            summarize_execution(&tool_result.output)
        )));
    }

    messages
}

/// Prompt text describing the conversation's files
pub fn describe_files(files: &[FileAttachment]) -> String {
    let mut out = String::from("Files in this conversation:\n");
    for file in files {
        let _ = writeln!(
            out,
            "\n## {} ({} bytes, {})",
            file.name,
            file.size,
            file.origin()
        );

        let profiled = file
            .rich_preview
            .clone()
            .or_else(|| {
                preview::is_tabular(&file.name)
                    .then(|| preview::preview_bytes(&file.name, &file.content).ok())
                    .flatten()
            })
            .and_then(|rich| profiler::profile(&rich).map(|p| (rich, p)));

        match profiled {
            Some((rich, profiled)) => {
                let _ = writeln!(out, "Columns: {}", rich.columns.join(", "));
                let _ = writeln!(out, "First rows:\n{}", rich.head);
                out.push_str(&profiled.describe());
            }
            None if !file.preview.is_empty() => {
                let _ = writeln!(out, "Preview:\n{}", file.preview);
            }
            None => {}
        }
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

/// Text summary of an execution result for the model
pub fn summarize_execution(output: &ExecuteResponse) -> String {
    let mut out = String::from("Execution result:\n");

    if !output.stdout.is_empty() {
        let _ = writeln!(out, "stdout:\n{}", truncate(&output.stdout, MAX_OUTPUT_CHARS));
    }
    if !output.stderr.is_empty() {
        let _ = writeln!(out, "stderr:\n{}", truncate(&output.stderr, MAX_OUTPUT_CHARS));
    }
    if let Some(error) = &output.error {
        let _ = writeln!(out, "error: {}: {}", error.name, error.value);
    }

    let texts: Vec<&str> = output
        .results
        .iter()
        .filter_map(|r| r.text.as_deref())
        .collect();
    for text in texts {
        let _ = writeln!(out, "result: {}", truncate(text, MAX_OUTPUT_CHARS));
    }

    let figures = output.results.iter().filter(|r| r.image().is_some()).count();
    if figures > 0 {
        let _ = writeln!(out, "{} figure(s) were displayed to the user.", figures);
    }

    if !output.generated_files.is_empty() {
        let _ = writeln!(out, "Generated files:");
        for file in &output.generated_files {
            let _ = writeln!(out, "- {} ({} bytes)", file.name, file.size);
        }
    }

    if output.stdout.is_empty()
        && output.stderr.is_empty()
        && output.error.is_none()
        && output.results.is_empty()
        && output.generated_files.is_empty()
    {
        out.push_str("(no output)\n");
    }
    out
}
