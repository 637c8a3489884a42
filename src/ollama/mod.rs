//! Ollama LLM integration module
//!
//! This module provides a streaming client for Ollama's `/api/chat`
//! endpoint and the [`ChatModel`] seam the agent loop is written against.

pub mod client;
pub mod tool_use;

pub use client::{ChatClient, ChatError, ChatModel, ChunkStream, Completion, ModelChunk};
pub use tool_use::{ChatMessage, FunctionCall, Tool, ToolCall, ToolFunction};
