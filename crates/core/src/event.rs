//! Domain events: explicit structured observation of agent activity.
//!
//! Agents and reasoning loops publish events to an injected [`EventBus`]
//! instead of writing to an ambient logger. Subscribers (UIs, test harnesses,
//! audit sinks) receive every event and filter for what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::message::Role;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A message was appended to an agent's history
    MessageAppended {
        agent: String,
        role: Role,
        chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// A memory policy rewrote the history before a model call
    MemoryApplied {
        agent: String,
        policy: String,
        before: usize,
        after: usize,
        timestamp: DateTime<Utc>,
    },

    /// A request is about to be sent to the backend
    RequestSent {
        agent: String,
        model: String,
        messages: usize,
        streaming: bool,
        timestamp: DateTime<Utc>,
    },

    /// The backend answered
    ResponseReceived {
        agent: String,
        model: String,
        chars: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A cached response was served
    CacheHit {
        agent: String,
        key: String,
        timestamp: DateTime<Utc>,
    },

    /// No cached response existed; the backend was called
    CacheMiss {
        agent: String,
        key: String,
        timestamp: DateTime<Utc>,
    },

    /// The model broke the reasoning protocol and was asked to correct itself
    ProtocolViolation {
        action_not_last: bool,
        observation_output: bool,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A reasoning loop reached its final answer
    AnswerCompleted {
        iterations: usize,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        if self.sender.send(Arc::new(event)).is_err() {
            trace!("Event published with no subscribers");
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
