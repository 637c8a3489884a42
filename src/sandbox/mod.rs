//! Sandboxed code execution
//!
//! Every approved `execute_python` call runs in its own freshly provisioned
//! remote sandbox that is torn down as soon as the run is over.
//!
//! ```text
//! ExecuteRequest ──► Orchestrator::execute
//!                        │
//!                        ├── SandboxProvider::create()      (fresh sandbox)
//!                        ├── Sandbox::write_file()          (stage inputs)
//!                        ├── Sandbox::run_code()            (one run)
//!                        ├── Sandbox::list_dir/read_file()  (generated files)
//!                        └── Sandbox::kill()                (always, once)
//!                        │
//!                        ▼
//!                  ExecuteResponse
//! ```

pub mod orchestrator;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::preview::RichPreview;

pub use orchestrator::Orchestrator;
pub use remote::RemoteSandboxProvider;

/// Directory inside the sandbox where files are staged and code runs
pub const MOUNT_DIR: &str = "/home/user";

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to provision sandbox: {0}")]
    Provision(String),
    #[error("sandbox request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sandbox service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("execution exceeded {secs}s")]
    Timeout { secs: u64 },
    #[error("invalid execution request: {0}")]
    InvalidInput(String),
}

impl SandboxError {
    pub fn is_provision(&self) -> bool {
        matches!(self, SandboxError::Provision(_))
    }
}

/// One entry of a sandbox directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
}

/// One rich result of a run (the value of a cell, a figure, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 PNG payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png: Option<String>,
    /// Base64 JPEG payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpeg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl ExecutionResult {
    pub fn image(&self) -> Option<&str> {
        self.png.as_deref().or(self.jpeg.as_deref())
    }
}

/// Fatal error raised by the user's code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub traceback: String,
}

/// Raw outcome of [`Sandbox::run_code`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub results: Vec<ExecutionResult>,
    pub error: Option<ExecutionError>,
}

/// A file shipped with an execution request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    /// Base64-encoded content
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub files: Vec<InputFile>,
}

/// A file the code left in the mount directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub name: String,
    /// Base64-encoded content
    pub content: String,
    pub size: usize,
    pub rich_preview: Option<RichPreview>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub stdout: String,
    pub stderr: String,
    pub results: Vec<ExecutionResult>,
    #[serde(default)]
    pub generated_files: Vec<GeneratedFile>,
    pub error: Option<ExecutionError>,
}

/// Creates fresh sandboxes
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

/// A live, exclusively owned sandbox
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SandboxError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError>;

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError>;

    async fn run_code(&self, code: &str, timeout: Duration) -> Result<RunOutput, SandboxError>;

    async fn kill(&self) -> Result<(), SandboxError>;
}
