//! Scripted model and in-memory sandbox shared by the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;

use datavisor::ollama::{ChatError, ChatMessage, ChatModel, ChunkStream, Completion, ModelChunk, Tool, ToolCall};
use datavisor::sandbox::{DirEntry, RunOutput, Sandbox, SandboxError, SandboxProvider, MOUNT_DIR};

pub type Script = Vec<Result<ModelChunk, ChatError>>;

/// Plays back one scripted answer per model call and records the prompts
pub struct ScriptedModel {
    turns: Mutex<Vec<Script>>,
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into_iter().rev().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat_stream(
        &self,
        _model: &str,
        messages: Vec<ChatMessage>,
        _tools: Vec<Tool>,
    ) -> Result<ChunkStream, ChatError> {
        self.calls.lock().push(messages);
        let turn = self.turns.lock().pop().unwrap_or_default();
        Ok(Box::pin(stream::iter(turn)))
    }
}

pub fn answer(tokens: &[&str], tool_calls: Vec<ToolCall>) -> Script {
    let mut out: Script = tokens
        .iter()
        .map(|t| Ok(ModelChunk::Token(t.to_string())))
        .collect();
    out.push(Ok(ModelChunk::Done(Completion {
        content: tokens.concat(),
        tool_calls,
        eval_count: tokens.len() as u32,
    })));
    out
}

pub fn call(name: &str, args: Value) -> ToolCall {
    ToolCall::new(name, args)
}

/// In-memory sandbox; the "code" writes `creates` into the mount directory
pub struct MemorySandbox {
    id: String,
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    output: RunOutput,
    creates: Vec<(String, Vec<u8>)>,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl Sandbox for MemorySandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
        self.files.lock().insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::Status { status: 404, body: path.to_string() })
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError> {
        let prefix = format!("{}/", path);
        Ok(self
            .files
            .lock()
            .iter()
            .filter_map(|(p, c)| {
                p.strip_prefix(&prefix).map(|name| DirEntry {
                    name: name.to_string(),
                    is_dir: false,
                    size: Some(c.len() as u64),
                })
            })
            .collect())
    }

    async fn run_code(&self, _code: &str, _timeout: Duration) -> Result<RunOutput, SandboxError> {
        let mut files = self.files.lock();
        for (name, content) in &self.creates {
            files.insert(format!("{}/{}", MOUNT_DIR, name), content.clone());
        }
        Ok(self.output.clone())
    }

    async fn kill(&self) -> Result<(), SandboxError> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fresh [`MemorySandbox`] per call
pub struct MemoryProvider {
    pub output: RunOutput,
    pub creates: Vec<(String, Vec<u8>)>,
    pub available: bool,
    pub created: AtomicUsize,
    pub kills: Arc<AtomicUsize>,
}

impl MemoryProvider {
    pub fn new(output: RunOutput, creates: Vec<(String, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self {
            output,
            creates,
            available: true,
            created: AtomicUsize::new(0),
            kills: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            output: RunOutput::default(),
            creates: Vec::new(),
            available: false,
            created: AtomicUsize::new(0),
            kills: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxProvider for MemoryProvider {
    async fn create(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        if !self.available {
            return Err(SandboxError::Provision("no capacity".to_string()));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySandbox {
            id: format!("mem-{}", n),
            files: Mutex::new(BTreeMap::new()),
            output: self.output.clone(),
            creates: self.creates.clone(),
            kills: self.kills.clone(),
        }))
    }
}
