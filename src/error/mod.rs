//! Error types for Skiff.

use thiserror::Error;

/// Primary error type for all Skiff operations.
#[derive(Error, Debug)]
pub enum SkiffError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("max turns exceeded: limit={limit}")]
    MaxTurnsExceeded { limit: u32 },

    #[error("tool call budget exceeded: limit={limit} used={used} requested={requested}")]
    ToolCallBudgetExceeded { limit: u32, used: u32, requested: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("path policy violation: {0}")]
    PathPolicy(String),

    #[error("network policy violation: {0}")]
    NetworkPolicy(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SkiffError {
    /// Whether this error is the expected result of a shutdown rather than a bug.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error reports an exhausted turn or tool-call budget.
    pub fn is_budget(&self) -> bool {
        matches!(
            self,
            Self::MaxTurnsExceeded { .. } | Self::ToolCallBudgetExceeded { .. }
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SkiffError>;
