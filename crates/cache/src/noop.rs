//! No-op cache, disables response caching entirely.

use agentry_core::cache::Cache;
use agentry_core::error::CacheError;
use async_trait::async_trait;

/// A cache that never remembers anything.
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &[u8], _value: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }
}
