//! # agentry core
//!
//! Domain types, collaborator traits, and error definitions for the agentry
//! conversational-agent library. This crate performs **no I/O**; it defines
//! the vocabulary that the cache and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model backend, key-value cache, tool) is a
//! trait here. Implementations live elsewhere or in the caller's code. This
//! enables:
//! - Composing decorators (caching, templating) by explicit construction
//! - Testing with scripted stand-ins for the model backend
//! - A clean dependency graph (all crates depend inward on core)

pub mod cache;
pub mod client;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cache::Cache;
pub use client::{ChatRequest, ChatResponse, Client, StreamChunk, Usage};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use tool::{Tool, Toolbox};
