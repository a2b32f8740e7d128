//! Token-budget window.

use agentry_core::error::{Error, Result};
use agentry_core::message::Message;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::Memory;
use super::token::TokenCounter;
use crate::options::AgentConfig;

/// Split `messages` into `(retained, dropped)` under a budget of `max_tokens`.
///
/// System messages are always retained. Among the rest, the retained set is a
/// contiguous run ending at the newest message: the scan walks backwards and
/// stops retaining at the first message that does not fit, even if older,
/// shorter ones would. Both halves keep their original order.
pub fn partition_by_token_limit(
    messages: &[Message],
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Result<(Vec<Message>, Vec<Message>)> {
    let Some(last) = messages.last() else {
        return Ok((Vec::new(), Vec::new()));
    };

    let tokens = messages
        .iter()
        .map(|m| counter.count(&m.content))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    debug!(total = tokens.iter().sum::<usize>(), "Token count");

    let system_tokens: usize = messages
        .iter()
        .zip(&tokens)
        .filter(|(m, _)| m.is_system())
        .map(|(_, t)| t)
        .sum();

    if system_tokens > max_tokens {
        return Err(Error::BudgetExceeded(format!(
            "system messages need {system_tokens} tokens, budget is {max_tokens}"
        )));
    }

    let mut available = max_tokens - system_tokens;
    let last_tokens = tokens[tokens.len() - 1];
    if !last.is_system() && last_tokens > available {
        return Err(Error::BudgetExceeded(format!(
            "system messages and the last message need {} tokens, budget is {max_tokens}",
            system_tokens + last_tokens
        )));
    }

    let mut retained = Vec::with_capacity(messages.len());
    let mut dropped = Vec::new();
    let mut started_dropping = false;

    for (message, &cost) in messages.iter().zip(&tokens).rev() {
        if message.is_system() {
            retained.push(message.clone());
        } else if !started_dropping && cost <= available {
            trace!(role = %message.role, cost, available, "Retaining");
            retained.push(message.clone());
            available -= cost;
        } else {
            trace!(role = %message.role, cost, available, "Dropping");
            started_dropping = true;
            dropped.push(message.clone());
        }
    }

    retained.reverse();
    dropped.reverse();
    Ok((retained, dropped))
}

/// Keeps the newest messages that fit in `max_tokens`, plus every system message.
#[derive(Clone)]
pub struct TokenBufferMemory {
    max_tokens: usize,
    counter: Arc<dyn TokenCounter>,
}

impl TokenBufferMemory {
    pub fn new(max_tokens: usize, counter: impl TokenCounter + 'static) -> Self {
        Self {
            max_tokens,
            counter: Arc::new(counter),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

#[async_trait]
impl Memory for TokenBufferMemory {
    fn name(&self) -> &str {
        "token_buffer"
    }

    fn fingerprint(&self) -> Value {
        json!({
            "policy": self.name(),
            "max_tokens": self.max_tokens,
            "counter": self.counter.fingerprint(),
        })
    }

    async fn apply(
        &self,
        _cancel: &CancellationToken,
        _config: &AgentConfig,
        messages: &[Message],
    ) -> Result<Vec<Message>> {
        let (retained, dropped) =
            partition_by_token_limit(messages, self.max_tokens, self.counter.as_ref())?;
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), retained = retained.len(), "Token buffer trimmed history");
        }
        Ok(retained)
    }
}

impl std::fmt::Debug for TokenBufferMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBufferMemory")
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}
