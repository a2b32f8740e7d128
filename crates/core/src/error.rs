//! Error types for the agentry domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum, folded into [`Error`]
//! through `#[from]` conversions so `?` works across layers.

use thiserror::Error;

/// The top-level error type for all agentry operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Memory policy errors ---
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Token count failed: {0}")]
    TokenCount(#[from] CountError),

    // --- Protocol errors ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Collaborator errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Unknown tool: {0:?}")]
    UnknownTool(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // --- Control flow ---
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Reaction loop stopped after {0} iterations without a final answer")]
    IterationLimit(u32),

    // --- Plumbing ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by a model backend. Passed through verbatim; retrying is
/// the job of a client wrapper, never of the agent core.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Backend returned no choices")]
    EmptyResponse,

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Raised by caching clients; the backend itself may be fine.
    #[error("Response cache failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Request serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// An entry exists but cannot be decoded.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountError {
    #[error("No tokenizer known for model {0:?}")]
    UnknownModel(String),

    #[error("Tokenizer failed: {0}")]
    Tokenizer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A non-blank line appeared before any tagged entry.
    #[error("unrecognized line {line_number}: {line:?}")]
    UnrecognizedLine { line_number: usize, line: String },

    /// An embedded conversation summary could not be decoded.
    #[error("malformed summary: {0}")]
    MalformedSummary(String),
}
