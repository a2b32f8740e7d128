//! Shared test doubles.

use agentry_core::client::{ChatRequest, ChatResponse, ChunkReceiver, Client, StreamChunk};
use agentry_core::error::{BackendError, ToolError};
use agentry_core::tool::Tool;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A client that plays back scripted replies and records every request.
///
/// Once the script runs out, calls fail with an API error.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ChatRequest) -> Result<String, BackendError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BackendError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            })
    }
}

#[async_trait]
impl Client for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        self.next(request).map(ChatResponse::text)
    }

    /// Streams the reply word by word.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, BackendError> {
        let reply = self.next(request)?;
        let pieces: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        let (tx, rx) = tokio::sync::mpsc::channel(pieces.len() + 1);
        let last = pieces.len().saturating_sub(1);
        for (i, piece) in pieces.into_iter().enumerate() {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(piece),
                    done: i == last,
                    usage: None,
                }))
                .await;
        }
        Ok(rx)
    }
}

/// A client whose calls never finish.
pub struct PendingClient;

#[async_trait]
impl Client for PendingClient {
    fn name(&self) -> &str {
        "pending"
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, BackendError> {
        std::future::pending().await
    }
}

/// A client whose stream yields one delta and then breaks.
pub struct InterruptedStreamClient {
    delta: String,
}

impl InterruptedStreamClient {
    pub fn new(delta: impl Into<String>) -> Self {
        Self { delta: delta.into() }
    }
}

#[async_trait]
impl Client for InterruptedStreamClient {
    fn name(&self) -> &str {
        "interrupted"
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, BackendError> {
        Err(BackendError::StreamInterrupted("connection reset".into()))
    }

    async fn stream(&self, _request: ChatRequest) -> Result<ChunkReceiver, BackendError> {
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(self.delta.clone()),
                done: false,
                usage: None,
            }))
            .await;
        let _ = tx
            .send(Err(BackendError::StreamInterrupted("connection reset".into())))
            .await;
        Ok(rx)
    }
}

/// An in-memory sink that can be inspected after being handed to an agent.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Echoes the action body back as the observation.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Repeats its input."
    }

    fn input(&self) -> &str {
        "Any text."
    }

    async fn work(
        &self,
        _cancel: &CancellationToken,
        _argument: &str,
        content: &str,
    ) -> Result<String, ToolError> {
        Ok(format!("echo: {content}"))
    }
}

/// Always fails.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Fails every time."
    }

    fn input(&self) -> &str {
        "Anything."
    }

    async fn work(
        &self,
        _cancel: &CancellationToken,
        argument: &str,
        _content: &str,
    ) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: argument.to_string(),
            reason: "out of order".into(),
        })
    }
}
