//! Caching client decorator.
//!
//! Wraps any [`Client`] and answers repeated requests from a [`Cache`]. The key
//! is the digest of the serialized request with the streaming flag cleared, so
//! a streamed and a non-streamed call for the same conversation share an entry.

use agentry_core::cache::Cache;
use agentry_core::client::{ChatRequest, ChatResponse, ChunkReceiver, Client, StreamChunk};
use agentry_core::error::{BackendError, CacheError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::digest::digest;

pub struct CachedClient {
    inner: Arc<dyn Client>,
    cache: Arc<dyn Cache>,
}

impl CachedClient {
    pub fn new(inner: Arc<dyn Client>, cache: Arc<dyn Cache>) -> Self {
        Self { inner, cache }
    }

    /// The cache key for `request`.
    pub fn key(request: &ChatRequest) -> Result<String, BackendError> {
        let mut normalized = request.clone();
        normalized.stream = false;
        let bytes = serde_json::to_vec(&normalized)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(digest(&[&bytes]))
    }

    async fn lookup(&self, key: &str) -> Result<Option<ChatResponse>, BackendError> {
        let Some(bytes) = self.cache.get(key.as_bytes()).await? else {
            return Ok(None);
        };
        let response = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(key = %key, error = %e, "Undecodable cache entry");
            CacheError::Corrupt(e.to_string())
        })?;
        Ok(Some(response))
    }
}

async fn store(cache: &dyn Cache, key: &str, response: &ChatResponse) -> Result<(), BackendError> {
    let bytes =
        serde_json::to_vec(response).map_err(|e| BackendError::Serialization(e.to_string()))?;
    cache.set(key.as_bytes(), &bytes).await?;
    Ok(())
}

#[async_trait]
impl Client for CachedClient {
    fn name(&self) -> &str {
        "cached"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        let key = Self::key(&request)?;
        if let Some(response) = self.lookup(&key).await? {
            debug!(key = %key, "Cache hit");
            return Ok(response);
        }

        debug!(key = %key, backend = %self.inner.name(), "Cache miss");
        let response = self.inner.complete(request).await?;
        store(self.cache.as_ref(), &key, &response).await?;
        Ok(response)
    }

    /// On a miss, chunks are forwarded as they arrive. The final chunk is held
    /// back until the full response is stored; a failed store replaces it with
    /// the error.
    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, BackendError> {
        let key = Self::key(&request)?;
        if let Some(response) = self.lookup(&key).await? {
            debug!(key = %key, "Cache hit (streaming)");
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
            return Ok(rx);
        }

        debug!(key = %key, backend = %self.inner.name(), "Cache miss (streaming)");
        let mut upstream = self.inner.stream(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            let mut text = String::new();
            let mut usage = None;

            while let Some(item) = upstream.recv().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        // Broken stream: nothing trustworthy to cache
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };
                if let Some(delta) = &chunk.content {
                    text.push_str(delta);
                }
                if chunk.usage.is_some() {
                    usage = chunk.usage;
                }
                if chunk.done {
                    let response = ChatResponse {
                        usage,
                        ..ChatResponse::text(text)
                    };
                    let outcome = store(cache.as_ref(), &key, &response).await.map(|()| chunk);
                    let _ = tx.send(outcome).await;
                    return;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }

            // Upstream closed without marking a final chunk
            let response = ChatResponse {
                usage,
                ..ChatResponse::text(text)
            };
            if let Err(e) = store(cache.as_ref(), &key, &response).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryCache;
    use agentry_core::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with the call number and streams it in two halves.
    struct CountingClient {
        calls: AtomicUsize,
    }

    impl CountingClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Client for CountingClient {
        fn name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ChatResponse::text(format!("answer {n}")))
        }

        async fn stream(&self, _request: ChatRequest) -> Result<ChunkReceiver, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            for (content, done) in [("answer ".to_string(), false), (n.to_string(), true)] {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(content),
                        done,
                        usage: None,
                    }))
                    .await;
            }
            Ok(rx)
        }
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            model: "gpt-4".into(),
            messages: vec![Message::user(text)],
            ..Default::default()
        }
    }

    async fn drain(mut rx: ChunkReceiver) -> String {
        let mut out = String::new();
        while let Some(chunk) = rx.recv().await {
            out.push_str(chunk.unwrap().content.as_deref().unwrap_or_default());
        }
        out
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let inner = Arc::new(CountingClient::new());
        let client = CachedClient::new(inner.clone(), Arc::new(InMemoryCache::new()));

        let first = client.complete(request("hi")).await.unwrap();
        let second = client.complete(request("hi")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        client.complete(request("different")).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn streamed_response_is_stored_for_later_calls() {
        let inner = Arc::new(CountingClient::new());
        let cache = InMemoryCache::new();
        let client = CachedClient::new(inner.clone(), Arc::new(cache.clone()));

        let mut req = request("stream me");
        req.stream = true;
        assert_eq!(drain(client.stream(req.clone()).await.unwrap()).await, "answer 1");
        // Stored before the final chunk was released
        assert_eq!(cache.len().await, 1);

        assert_eq!(drain(client.stream(req).await.unwrap()).await, "answer 1");
        let plain = client.complete(request("stream me")).await.unwrap();
        assert_eq!(plain.choices[0].content, "answer 1");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    /// A store whose backing service is down, or one holding garbage.
    struct BrokenCache {
        entry: Option<Vec<u8>>,
    }

    #[async_trait]
    impl Cache for BrokenCache {
        fn name(&self) -> &str {
            "broken"
        }

        async fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
            match &self.entry {
                Some(bytes) => Ok(Some(bytes.clone())),
                None => Err(CacheError::Storage("store offline".into())),
            }
        }

        async fn set(&self, _key: &[u8], _value: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::Storage("store offline".into()))
        }
    }

    #[tokio::test]
    async fn cache_read_failure_is_returned() {
        let inner = Arc::new(CountingClient::new());
        let client = CachedClient::new(inner.clone(), Arc::new(BrokenCache { entry: None }));

        let err = client.complete(request("hi")).await.unwrap_err();
        assert!(matches!(err, BackendError::Cache(CacheError::Storage(_))));
        assert!(client.stream(request("hi")).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_entry_is_returned() {
        let inner = Arc::new(CountingClient::new());
        let cache = BrokenCache {
            entry: Some(b"not json".to_vec()),
        };
        let client = CachedClient::new(inner.clone(), Arc::new(cache));

        let err = client.complete(request("hi")).await.unwrap_err();
        assert!(matches!(err, BackendError::Cache(CacheError::Corrupt(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_write_failure_replaces_the_final_chunk() {
        let inner = Arc::new(CountingClient::new());
        let cache = InMemoryCache::new();
        let client = CachedClient::new(inner.clone(), Arc::new(cache.clone()));
        let failing = CachedClient::new(
            inner.clone(),
            Arc::new(WriteFailingCache(cache.clone())),
        );

        let err = failing.complete(request("hi")).await.unwrap_err();
        assert!(matches!(err, BackendError::Cache(CacheError::Storage(_))));

        let mut rx = failing.stream(request("hi")).await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("answer "));
        assert!(!first.done);
        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(BackendError::Cache(CacheError::Storage(_)))
        ));
        assert!(rx.recv().await.is_none());
        assert!(cache.is_empty().await);

        // The working client still caches normally
        client.complete(request("hi")).await.unwrap();
        assert_eq!(cache.len().await, 1);
    }

    /// Reads from the wrapped cache, refuses every write.
    struct WriteFailingCache(InMemoryCache);

    #[async_trait]
    impl Cache for WriteFailingCache {
        fn name(&self) -> &str {
            "write_failing"
        }

        async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
            self.0.get(key).await
        }

        async fn set(&self, _key: &[u8], _value: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::Storage("disk full".into()))
        }
    }

    #[test]
    fn key_ignores_streaming_flag() {
        let mut streamed = request("x");
        streamed.stream = true;
        assert_eq!(
            CachedClient::key(&streamed).unwrap(),
            CachedClient::key(&request("x")).unwrap()
        );
        assert_ne!(
            CachedClient::key(&request("x")).unwrap(),
            CachedClient::key(&request("y")).unwrap()
        );
    }
}
