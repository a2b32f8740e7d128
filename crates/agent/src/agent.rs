//! The conversational agent.
//!
//! An agent owns a name, an ordered message history and a base
//! [`AgentConfig`]. `respond` runs one model call:
//!
//! 1. clone the base config and apply the per-call options
//! 2. run the memory policy (if any) over the history
//! 3. send exactly one request, streaming into the sink when one is set
//! 4. on success, store the rewritten history plus the assistant reply
//!
//! A failed or cancelled call leaves the history exactly as it was.

use agentry_core::client::{ChatRequest, Client};
use agentry_core::error::{BackendError, Error, Result};
use agentry_core::event::DomainEvent;
use agentry_core::message::{Message, Role};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::io::Write;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::options::{AgentConfig, AgentOption, OutputSink};

#[async_trait]
pub trait Agent: Send {
    fn name(&self) -> &str;

    /// Append a system message.
    ///
    /// `data` is for agents that build the message from structured input; plain
    /// agents reject it.
    fn system(&mut self, text: &str, data: Option<&Value>) -> Result<String>;

    /// Append a user message.
    fn listen(&mut self, text: &str, data: Option<&Value>) -> Result<String>;

    /// Append an assistant message the model never produced.
    fn inject(&mut self, text: &str, data: Option<&Value>) -> Result<String>;

    /// Get the next assistant reply. `options` apply to this call only.
    async fn respond(
        &mut self,
        cancel: &CancellationToken,
        options: Vec<AgentOption>,
    ) -> Result<String>;

    fn messages(&self) -> &[Message];

    fn append(&mut self, message: Message);

    fn config(&self) -> &AgentConfig;
}

pub struct BaseAgent {
    name: String,
    messages: Vec<Message>,
    config: AgentConfig,
}

impl BaseAgent {
    /// Create an agent; options are applied in order.
    pub fn new(name: impl Into<String>, options: impl IntoIterator<Item = AgentOption>) -> Self {
        Self {
            name: name.into(),
            messages: Vec::new(),
            config: AgentConfig::default().with_options(options),
        }
    }

    fn push(&mut self, role: Role, text: &str, data: Option<&Value>) -> Result<String> {
        if data.is_some() {
            return Err(Error::config(format!(
                "agent {:?} does not accept data for {role} messages",
                self.name
            )));
        }
        self.append(Message::new(role, text));
        Ok(text.to_string())
    }

    async fn call(
        &self,
        cancel: &CancellationToken,
        config: &AgentConfig,
        client: &dyn Client,
    ) -> Result<(Vec<Message>, String)> {
        let history = match &config.memory {
            Some(memory) => {
                let rewritten = memory.apply(cancel, config, &self.messages).await?;
                debug!(
                    agent = %self.name,
                    policy = memory.name(),
                    before = self.messages.len(),
                    after = rewritten.len(),
                    "Memory applied"
                );
                config.publish(DomainEvent::MemoryApplied {
                    agent: self.name.clone(),
                    policy: memory.name().to_string(),
                    before: self.messages.len(),
                    after: rewritten.len(),
                    timestamp: Utc::now(),
                });
                rewritten
            }
            None => self.messages.clone(),
        };

        let request = config.to_request(history.clone());
        let streaming = request.stream;

        info!(
            agent = %self.name,
            model = %config.model,
            messages = request.messages.len(),
            streaming,
            "Sending request"
        );
        config.publish(DomainEvent::RequestSent {
            agent: self.name.clone(),
            model: config.model.clone(),
            messages: request.messages.len(),
            streaming,
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let reply = match &config.output {
            Some(sink) => stream_reply(client, request, sink).await?,
            None => client
                .complete(request)
                .await?
                .choices
                .into_iter()
                .next()
                .ok_or(BackendError::EmptyResponse)?
                .content,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(agent = %self.name, chars = reply.len(), duration_ms, "Received response");
        config.publish(DomainEvent::ResponseReceived {
            agent: self.name.clone(),
            model: config.model.clone(),
            chars: reply.len(),
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok((history, reply))
    }
}

/// Forward every delta to `sink` while accumulating the full reply.
async fn stream_reply(client: &dyn Client, request: ChatRequest, sink: &OutputSink) -> Result<String> {
    let mut chunks = client.stream(request).await?;
    let mut reply = String::new();

    while let Some(chunk) = chunks.recv().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.content.as_deref()
            && !delta.is_empty()
        {
            write_to_sink(sink, delta)?;
            reply.push_str(delta);
        }
        if chunk.done {
            break;
        }
    }

    Ok(reply)
}

pub(crate) fn write_to_sink(sink: &OutputSink, text: &str) -> Result<()> {
    let mut out = sink
        .lock()
        .map_err(|_| Error::Io(std::io::Error::other("output sink lock poisoned")))?;
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}

#[async_trait]
impl Agent for BaseAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn system(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.push(Role::System, text, data)
    }

    fn listen(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.push(Role::User, text, data)
    }

    fn inject(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.push(Role::Assistant, text, data)
    }

    async fn respond(
        &mut self,
        cancel: &CancellationToken,
        options: Vec<AgentOption>,
    ) -> Result<String> {
        let config = self.config.with_options(options);
        let client = config.client.clone().ok_or_else(|| {
            BackendError::NotConfigured(format!("agent {:?} has no client", self.name))
        })?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.call(cancel, &config, client.as_ref()) => result,
        };

        match outcome {
            Ok((history, reply)) => {
                self.messages = history;
                self.append(Message::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Respond failed");
                config.publish(DomainEvent::ErrorOccurred {
                    context: format!("agent {} respond", self.name),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn append(&mut self, message: Message) {
        self.config.publish(DomainEvent::MessageAppended {
            agent: self.name.clone(),
            role: message.role,
            chars: message.content.len(),
            timestamp: Utc::now(),
        });
        self.messages.push(message);
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }
}

impl std::fmt::Debug for BaseAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAgent")
            .field("name", &self.name)
            .field("messages", &self.messages.len())
            .field("config", &self.config)
            .finish()
    }
}
