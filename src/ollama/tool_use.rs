//! Chat wire types and tool-call recovery
//!
//! Mirrors the message and tool shapes of Ollama's `/api/chat` endpoint.

use serde::{Deserialize, Serialize};

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Assistant message that also carries the tool calls it requested
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role("assistant", content)
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::with_role("tool", content)
    }
}

/// A tool invocation as emitted by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Tool definition handed to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String, // Always "function"
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema
}

impl Tool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ToolFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// One NDJSON line of a streaming `/api/chat` response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Recover tool calls that a model wrote into its text instead of the
/// native `tool_calls` field
///
/// Accepts `{"name": ..., "arguments": {...}}` objects (or `parameters` in
/// place of `arguments`), either as the whole content or embedded in prose.
/// Only names in `known` are accepted so that ordinary JSON in an answer is
/// never mistaken for a call.
pub fn parse_tool_calls_from_text(content: &str, known: &[&str]) -> Vec<ToolCall> {
    let content = content.trim();

    if let Some(call) = parse_candidate(content, known) {
        return vec![call];
    }

    let mut calls = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        calls.extend(parse_candidate(&content[s..=i], known));
                    }
                }
            }
            _ => {}
        }
    }

    calls
}

fn parse_candidate(json: &str, known: &[&str]) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let name = value.get("name")?.as_str()?;
    if !known.contains(&name) {
        return None;
    }
    let arguments = value
        .get("arguments")
        .or_else(|| value.get("parameters"))
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall::new(name, arguments))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: &[&str] = &["execute_python", "list_files"];

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::tool("r").role, "tool");
        let m = ChatMessage::assistant_with_tools("", vec![ToolCall::new("list_files", serde_json::json!({}))]);
        assert_eq!(m.tool_calls.len(), 1);
    }

    #[test]
    fn test_tool_calls_omitted_when_empty() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_whole_content_call() {
        let calls = parse_tool_calls_from_text(
            r#"{"name": "execute_python", "arguments": {"code": "print(1)"}}"#,
            KNOWN,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments["code"], "print(1)");
    }

    #[test]
    fn test_embedded_call_with_braces_in_strings() {
        let text = r#"Sure. {"name": "execute_python", "parameters": {"code": "d = {'a': 1}\nprint(d)"}} done"#;
        let calls = parse_tool_calls_from_text(text, KNOWN);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "execute_python");
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let text = r#"The config is {"name": "server", "arguments": {}}"#;
        assert!(parse_tool_calls_from_text(text, KNOWN).is_empty());
    }

    #[test]
    fn test_stream_line_parses() {
        let line = r#"{"model":"qwen3","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        let resp: ChatResponse = serde_json::from_str(line).unwrap();
        assert_eq!(resp.message.unwrap().content, "Hi");
        assert!(!resp.done);
    }
}
