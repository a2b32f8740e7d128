//! History policies.
//!
//! A [`Memory`] receives the full conversation right before a model call and
//! returns the messages that should actually be sent. Every policy keeps all
//! system messages, keeps the final message and preserves relative order, or
//! fails with [`Error::BudgetExceeded`](agentry_core::Error::BudgetExceeded).

pub mod buffer;
pub mod summarizer;
pub mod token;
pub mod token_buffer;

pub use buffer::BufferMemory;
pub use summarizer::{SummarizerMemory, SummaryInput};
pub use token::{CharTokenCounter, NaiveTokenCounter, TokenCounter};
pub use token_buffer::{TokenBufferMemory, partition_by_token_limit};

use agentry_core::error::Result;
use agentry_core::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::options::AgentConfig;

#[async_trait]
pub trait Memory: Send + Sync {
    /// Policy name, used in logs and cache fingerprints.
    fn name(&self) -> &str;

    /// The policy name plus every parameter that changes what gets sent.
    /// Two policies with equal fingerprints must rewrite histories the same way.
    fn fingerprint(&self) -> Value;

    /// Rewrite `messages` for a call made with `config`.
    async fn apply(
        &self,
        cancel: &CancellationToken,
        config: &AgentConfig,
        messages: &[Message],
    ) -> Result<Vec<Message>>;
}
