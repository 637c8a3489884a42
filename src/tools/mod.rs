//! Tool registry
//!
//! The model can call a closed set of tools. They are split at the type
//! level into [`AutoTool`]s, which the agent loop executes on its own, and
//! [`ApprovalTool`]s, which stop the turn until a human approves them.
//!
//! ```text
//! model tool call ──► ToolCall::parse(name, args)
//!                        ├── Ok(Auto(..))      ──► execute, feed result back
//!                        ├── Ok(Approval(..))  ──► pending_tool_call, END
//!                        └── Err(ToolParseError) ──► error text fed back
//! ```

mod builtin;

use serde_json::{json, Value};

use crate::files::FileAttachment;
use crate::ollama::Tool;

pub use builtin::ToolError;

pub const LIST_FILES: &str = "list_files";
pub const PROFILE_DATASET: &str = "profile_dataset";
pub const SUGGEST_ANALYSIS: &str = "suggest_analysis";
pub const EXECUTE_PYTHON: &str = "execute_python";

/// Every tool name the model may use
pub const TOOL_NAMES: &[&str] = &[LIST_FILES, PROFILE_DATASET, SUGGEST_ANALYSIS, EXECUTE_PYTHON];

/// Tools the agent loop runs without asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoTool {
    ListFiles,
    ProfileDataset { file: String },
    SuggestAnalysis { file: String, goal: Option<String> },
}

/// Tools that need human approval before they run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalTool {
    ExecutePython { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Auto(AutoTool),
    Approval(ApprovalTool),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolParseError {
    #[error("unknown tool '{name}', available tools: {}", TOOL_NAMES.join(", "))]
    UnknownTool { name: String },
    #[error("tool '{tool}' requires the '{argument}' argument")]
    MissingArgument { tool: &'static str, argument: &'static str },
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
}

/// Execution context for auto tools: the files of the current turn
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub files: &'a [FileAttachment],
}

impl ToolCall {
    /// Turn a model invocation into a typed call
    ///
    /// Arguments may arrive as an object or as a JSON-encoded string.
    pub fn parse(name: &str, args: &Value) -> Result<Self, ToolParseError> {
        let decoded;
        let args = match args {
            Value::String(raw) => {
                decoded = serde_json::from_str::<Value>(raw).map_err(|e| {
                    ToolParseError::InvalidArguments {
                        tool: static_name(name).unwrap_or("tool"),
                        reason: e.to_string(),
                    }
                })?;
                &decoded
            }
            other => other,
        };

        match name {
            LIST_FILES => Ok(ToolCall::Auto(AutoTool::ListFiles)),
            PROFILE_DATASET => Ok(ToolCall::Auto(AutoTool::ProfileDataset {
                file: required_str(args, PROFILE_DATASET, "file")?,
            })),
            SUGGEST_ANALYSIS => Ok(ToolCall::Auto(AutoTool::SuggestAnalysis {
                file: required_str(args, SUGGEST_ANALYSIS, "file")?,
                goal: optional_str(args, SUGGEST_ANALYSIS, "goal")?,
            })),
            EXECUTE_PYTHON => {
                let code = required_str(args, EXECUTE_PYTHON, "code")?;
                if code.trim().is_empty() {
                    return Err(ToolParseError::InvalidArguments {
                        tool: EXECUTE_PYTHON,
                        reason: "code is empty".to_string(),
                    });
                }
                Ok(ToolCall::Approval(ApprovalTool::ExecutePython { code }))
            }
            other => Err(ToolParseError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Auto(tool) => tool.name(),
            ToolCall::Approval(ApprovalTool::ExecutePython { .. }) => EXECUTE_PYTHON,
        }
    }

    /// Normalized arguments, as reported in events
    pub fn args(&self) -> Value {
        match self {
            ToolCall::Auto(tool) => tool.args(),
            ToolCall::Approval(ApprovalTool::ExecutePython { code }) => json!({ "code": code }),
        }
    }

    pub fn requires_approval(&self) -> bool {
        matches!(self, ToolCall::Approval(_))
    }
}

impl AutoTool {
    pub fn name(&self) -> &'static str {
        match self {
            AutoTool::ListFiles => LIST_FILES,
            AutoTool::ProfileDataset { .. } => PROFILE_DATASET,
            AutoTool::SuggestAnalysis { .. } => SUGGEST_ANALYSIS,
        }
    }

    pub fn args(&self) -> Value {
        match self {
            AutoTool::ListFiles => json!({}),
            AutoTool::ProfileDataset { file } => json!({ "file": file }),
            AutoTool::SuggestAnalysis { file, goal } => json!({ "file": file, "goal": goal }),
        }
    }

    /// Run the tool against the turn's files
    pub fn execute(&self, ctx: &ToolContext<'_>) -> Result<Value, ToolError> {
        match self {
            AutoTool::ListFiles => Ok(builtin::list_files(ctx)),
            AutoTool::ProfileDataset { file } => builtin::profile_dataset(ctx, file),
            AutoTool::SuggestAnalysis { file, goal } => {
                builtin::suggest_analysis(ctx, file, goal.as_deref())
            }
        }
    }
}

fn static_name(name: &str) -> Option<&'static str> {
    TOOL_NAMES.iter().copied().find(|n| *n == name)
}

fn required_str(args: &Value, tool: &'static str, argument: &'static str) -> Result<String, ToolParseError> {
    optional_str(args, tool, argument)?.ok_or(ToolParseError::MissingArgument { tool, argument })
}

fn optional_str(
    args: &Value,
    tool: &'static str,
    argument: &'static str,
) -> Result<Option<String>, ToolParseError> {
    match args.get(argument) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ToolParseError::InvalidArguments {
            tool,
            reason: format!("'{}' must be a string, got {}", argument, other),
        }),
    }
}

/// JSON schemas handed to the model
pub fn tool_schemas() -> Vec<Tool> {
    vec![
        Tool::function(
            LIST_FILES,
            "List the files available in this conversation with their sizes and whether they were uploaded or generated.",
            json!({ "type": "object", "properties": {} }),
        ),
        Tool::function(
            PROFILE_DATASET,
            "Classify a tabular file (time series, geospatial, transactional, ...) and return its structural profile and recommended analyses.",
            json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "Name of the file to profile" }
                },
                "required": ["file"]
            }),
        ),
        Tool::function(
            SUGGEST_ANALYSIS,
            "Suggest a step-by-step analysis plan for a tabular file, optionally focused on a goal.",
            json!({
                "type": "object",
                "properties": {
                    "file": { "type": "string", "description": "Name of the file to analyze" },
                    "goal": { "type": "string", "description": "What the user wants to learn" }
                },
                "required": ["file"]
            }),
        ),
        Tool::function(
            EXECUTE_PYTHON,
            "Run Python code in a fresh, isolated sandbox. Files are mounted under /home/user. The user must approve the code before it runs.",
            json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Complete, self-contained Python program" }
                },
                "required": ["code"]
            }),
        ),
    ]
}
