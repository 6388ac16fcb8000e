//! Error taxonomy for the sync client
//!
//! Each variant maps to a distinct recovery path: configuration errors
//! require a user fix, transport errors feed the reconnect loop, parse
//! errors drop the offending message, and validation/not-found errors
//! trigger rollback of the optimistic mutation that caused them.

use thiserror::Error;

/// Errors surfaced by the sync client
#[derive(Error, Debug)]
pub enum SyncError {
    /// No channel URL available. Terminal until the user supplies one.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Socket or HTTP transport failure. Recovered by reconnection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed inbound payload. The message is dropped, the channel
    /// stays up.
    #[error("Failed to parse inbound message: {0}")]
    Parse(String),

    /// The server rejected a mutation. Carries the server detail verbatim.
    #[error("Server rejected the request: {0}")]
    Validation(String),

    /// Another mutation is already in flight for the same entry.
    #[error("A mutation is already pending for log entry '{id}'")]
    Busy { id: String },

    /// The target entry does not exist (locally or server-side).
    #[error("Log entry '{id}' not found")]
    NotFound { id: String },
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
