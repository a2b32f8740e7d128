//! In-memory cache, useful for tests and single-process sessions.

use agentry_core::cache::Cache;
use agentry_core::error::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An unbounded map guarded by a reader-writer lock.
///
/// Cloning shares the underlying map.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
