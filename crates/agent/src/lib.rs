//! Conversational agents for agentry.
//!
//! An agent owns an ordered message history and a configuration. Each
//! `respond` call follows the same path:
//!
//! 1. **Apply options** for this call on top of the agent's configuration
//! 2. **Run the memory policy** to decide which messages are sent
//! 3. **Call the backend**, streaming into the output sink if one is set
//! 4. **Commit** the rewritten history and the assistant reply
//!
//! Decorators ([`CachedAgent`], [`TemplatedAgent`]) wrap any [`Agent`], and
//! [`ReAct`] drives an agent through the tagged Thought/Action/Observation
//! protocol with a set of tools.

pub mod agent;
pub mod cached;
pub mod memory;
pub mod options;
pub mod react;
pub mod settings;
pub mod template;
pub mod templated;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, BaseAgent};
pub use cached::CachedAgent;
pub use memory::{
    BufferMemory, CharTokenCounter, Memory, NaiveTokenCounter, SummarizerMemory, TokenBufferMemory,
    TokenCounter,
};
pub use options::{AgentConfig, AgentOption, OutputSink};
pub use react::{Entry, ReAct, ReactResult, Tag, Violation};
pub use templated::TemplatedAgent;
