//! The cache trait: a flat key-value store of byte blobs.
//!
//! Used by the response-caching decorators. Eviction and persistence are the
//! implementation's business. Implementations must tolerate concurrent `get`
//! and `set` calls from independent agents.

use async_trait::async_trait;

use crate::error::CacheError;

#[async_trait]
pub trait Cache: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Look up `key`. `Ok(None)` means a clean miss.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), CacheError>;
}
