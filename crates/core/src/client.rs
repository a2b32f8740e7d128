//! The client trait over model backends.
//!
//! A Client knows how to send a conversation to a language model and get a
//! response back, either as a complete message or as a stream of text deltas.
//! Provider-specific request translation lives in the implementations, never in
//! the agent core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::BackendError;
use crate::message::Message;

/// A single chat completion request.
///
/// Maps are `BTreeMap`s so that serializing the same request twice always
/// yields the same bytes (the caching decorators hash this form).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "gpt-4", "claude-2")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub logit_bias: BTreeMap<String, i32>,

    /// End-user identifier forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Escape hatch for backend-specific parameters. The client is
    /// responsible for rejecting values it does not understand.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_params: BTreeMap<String, serde_json::Value>,

    /// Whether the caller will consume the response through `Client::stream`
    #[serde(default)]
    pub stream: bool,
}

/// A complete (non-streaming) response from a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated messages; the agent uses the first one.
    pub choices: Vec<Message>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Build a single-choice assistant response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Message::assistant(content)],
            usage: None,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Receiving half of a streamed response.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, BackendError>>;

/// The core Client trait.
///
/// Every model backend implements this trait, and so does every decorator
/// wrapping one (caching, rate limiting, retries). The agent calls
/// `complete()` or `stream()` without knowing what sits behind it.
#[async_trait]
pub trait Client: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "cached").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<ChatResponse, BackendError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(&self, request: ChatRequest) -> std::result::Result<ChunkReceiver, BackendError> {
        let response = self.complete(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .ok_or(BackendError::EmptyResponse)?
            .content;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}
