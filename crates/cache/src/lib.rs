//! Cache backends and the caching client decorator for agentry.

pub mod client;
pub mod digest;
pub mod in_memory;
pub mod noop;

pub use client::CachedClient;
pub use digest::digest;
pub use in_memory::InMemoryCache;
pub use noop::NoopCache;
