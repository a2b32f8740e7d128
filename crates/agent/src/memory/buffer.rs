//! Message-count window.

use agentry_core::error::{Error, Result};
use agentry_core::message::Message;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Memory;
use crate::options::AgentConfig;

/// Keeps the last `size` messages, counting system messages against the
/// window but never dropping them.
#[derive(Debug, Clone, Copy)]
pub struct BufferMemory {
    size: usize,
}

impl BufferMemory {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The policy itself, without the async plumbing.
    pub fn retain(&self, messages: &[Message]) -> Result<Vec<Message>> {
        if messages.len() <= self.size {
            return Ok(messages.to_vec());
        }

        let system = messages.iter().filter(|m| m.is_system()).count();
        let quota = self.size as isize - system as isize;
        let last_is_system = messages.last().is_some_and(Message::is_system);

        if (last_is_system && quota < 0) || quota < 1 {
            return Err(Error::BudgetExceeded(format!(
                "buffer of {} messages cannot hold {} system messages and a reply",
                self.size, system
            )));
        }

        let mut remaining = quota as usize;
        let mut kept = Vec::with_capacity(self.size);
        for message in messages.iter().rev() {
            if message.is_system() {
                kept.push(message.clone());
            } else if remaining > 0 {
                kept.push(message.clone());
                remaining -= 1;
            } else {
                debug!(role = %message.role, "Buffer dropping message");
            }
        }
        kept.reverse();
        Ok(kept)
    }
}

#[async_trait]
impl Memory for BufferMemory {
    fn name(&self) -> &str {
        "buffer"
    }

    fn fingerprint(&self) -> Value {
        json!({ "policy": self.name(), "size": self.size })
    }

    async fn apply(
        &self,
        _cancel: &CancellationToken,
        _config: &AgentConfig,
        messages: &[Message],
    ) -> Result<Vec<Message>> {
        self.retain(messages)
    }
}
