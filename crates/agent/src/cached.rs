//! Response caching for agents.
//!
//! [`CachedAgent`] wraps any [`Agent`] and answers a `respond` call from the
//! cache when the same history was already answered under the same effective
//! configuration. Handy during development to avoid paying for repeated calls.

use agentry_cache::digest;
use agentry_core::cache::Cache;
use agentry_core::error::{CacheError, Result};
use agentry_core::event::DomainEvent;
use agentry_core::message::Message;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{Agent, write_to_sink};
use crate::options::{AgentConfig, AgentOption};

pub struct CachedAgent<A> {
    inner: A,
    cache: Arc<dyn Cache>,
}

impl<A: Agent> CachedAgent<A> {
    pub fn new(inner: A, cache: Arc<dyn Cache>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Cache key for the current history under `options`.
    ///
    /// SHA-256 over the serialized messages followed by the serialized
    /// configuration fingerprint, hex encoded.
    pub fn key(&self, options: &[AgentOption]) -> Result<String> {
        let config = self.inner.config().with_options(options.iter().cloned());
        self.key_for(&config)
    }

    fn key_for(&self, config: &AgentConfig) -> Result<String> {
        let messages = serde_json::to_vec(self.inner.messages())?;
        let settings = serde_json::to_vec(&config.fingerprint())?;
        Ok(digest(&[&messages, &settings]))
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        let Some(bytes) = self.cache.get(key.as_bytes()).await? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes).map_err(|e| {
            warn!(key = %key, "Cache entry is not UTF-8");
            CacheError::Corrupt(e.to_string())
        })?;
        Ok(Some(text))
    }
}

#[async_trait]
impl<A: Agent + Sync> Agent for CachedAgent<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn system(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.inner.system(text, data)
    }

    fn listen(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.inner.listen(text, data)
    }

    fn inject(&mut self, text: &str, data: Option<&Value>) -> Result<String> {
        self.inner.inject(text, data)
    }

    async fn respond(
        &mut self,
        cancel: &CancellationToken,
        options: Vec<AgentOption>,
    ) -> Result<String> {
        let config = self.inner.config().with_options(options.iter().cloned());
        let key = self.key_for(&config)?;

        if let Some(cached) = self.lookup(&key).await? {
            debug!(agent = %self.inner.name(), key = %key, "Cached response");
            config.publish(DomainEvent::CacheHit {
                agent: self.inner.name().to_string(),
                key: key.clone(),
                timestamp: Utc::now(),
            });
            if let Some(sink) = &config.output {
                write_to_sink(sink, &cached)?;
            }
            self.inner.append(Message::assistant(cached.clone()));
            return Ok(cached);
        }

        config.publish(DomainEvent::CacheMiss {
            agent: self.inner.name().to_string(),
            key: key.clone(),
            timestamp: Utc::now(),
        });
        let reply = self.inner.respond(cancel, options).await?;
        self.cache.set(key.as_bytes(), reply.as_bytes()).await?;
        Ok(reply)
    }

    fn messages(&self) -> &[Message] {
        self.inner.messages()
    }

    fn append(&mut self, message: Message) {
        self.inner.append(message)
    }

    fn config(&self) -> &AgentConfig {
        self.inner.config()
    }
}
