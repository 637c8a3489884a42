//! Streaming client for Ollama's `/api/chat` endpoint
//!
//! The response is newline-delimited JSON. Network chunks do not line up
//! with JSON lines, so bytes are buffered and split on `\n` before parsing.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};

use super::tool_use::{parse_tool_calls_from_text, ChatMessage, ChatResponse, Tool, ToolCall};

/// One item of a streamed model turn
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    /// A token fragment from the model's response
    Token(String),
    /// The parsed model turn, sent once after the last token
    Done(Completion),
}

/// A finished model turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Full text of the turn (concatenation of every token)
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Number of tokens generated
    pub eval_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model error: {0}")]
    Model(String),
    #[error("stream ended before the final chunk")]
    Incomplete,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, ChatError>> + Send>>;

/// An LLM completion service: message history plus tool schemas in, token
/// stream plus tool calls out
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<Tool>,
    ) -> Result<ChunkStream, ChatError>;
}

/// Client for Ollama's /api/chat endpoint with tool support
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<Tool>,
    ) -> Result<ChunkStream, ChatError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let known: Vec<String> = tools.iter().map(|t| t.function.name.clone()).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "options": {
                "temperature": 0.0
            }
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(&tools)?;
        }

        let response = self.client.post(&endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(decode_ndjson(response.bytes_stream(), known)))
    }
}

/// Running state of one streamed turn
struct Accumulator {
    known: Vec<String>,
    content: String,
    tool_calls: Vec<ToolCall>,
}

impl Accumulator {
    fn feed(&mut self, line: &[u8]) -> Result<Vec<ModelChunk>, ChatError> {
        let start = line
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(line.len());
        let end = line
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(start, |i| i + 1);
        let line = &line[start..end];
        if line.is_empty() {
            return Ok(Vec::new());
        }

        let response: ChatResponse = serde_json::from_slice(line)?;
        if let Some(error) = response.error {
            return Err(ChatError::Model(error));
        }

        let mut out = Vec::new();
        if let Some(message) = response.message {
            if !message.content.is_empty() {
                self.content.push_str(&message.content);
                out.push(ModelChunk::Token(message.content));
            }
            self.tool_calls.extend(message.tool_calls);
        }
        if response.done {
            out.push(ModelChunk::Done(self.finish(response.eval_count)));
        }
        Ok(out)
    }

    fn finish(&mut self, eval_count: u32) -> Completion {
        let content = std::mem::take(&mut self.content);
        let mut tool_calls = std::mem::take(&mut self.tool_calls);
        if tool_calls.is_empty() {
            // Some models write the call into the text instead of tool_calls
            let known: Vec<&str> = self.known.iter().map(String::as_str).collect();
            tool_calls = parse_tool_calls_from_text(&content, &known);
        }
        Completion {
            content,
            tool_calls,
            eval_count,
        }
    }
}

/// Turn a byte stream of NDJSON chat responses into model chunks
pub(crate) fn decode_ndjson<S, B, E>(
    bytes: S,
    known_tools: Vec<String>,
) -> impl Stream<Item = Result<ModelChunk, ChatError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<ChatError> + Send,
{
    async_stream::stream! {
        futures_util::pin_mut!(bytes);
        let mut acc = Accumulator {
            known: known_tools,
            content: String::new(),
            tool_calls: Vec::new(),
        };
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(chunk.as_ref()),
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match acc.feed(&line) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            finished |= matches!(chunk, ModelChunk::Done(_));
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
                if finished {
                    return;
                }
            }
        }

        // Final line without a trailing newline
        match acc.feed(&buffer) {
            Ok(chunks) => {
                for chunk in chunks {
                    finished |= matches!(chunk, ModelChunk::Done(_));
                    yield Ok(chunk);
                }
            }
            Err(e) => {
                yield Err(e);
                return;
            }
        }
        if !finished {
            yield Err(ChatError::Incomplete);
        }
    }
}
