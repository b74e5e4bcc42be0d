//! Error types for simkv

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Availability Errors ===
    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("Quorum unavailable: need {needed}, reachable {reachable}")]
    QuorumUnavailable { needed: usize, reachable: usize },

    // === Versioning Errors ===
    #[error("Conflict unresolved: {0}")]
    ConflictUnresolved(String),

    #[error("Clock skew violation on {node}: own component went {before} -> {after}")]
    ClockSkewViolation {
        node: String,
        before: u64,
        after: u64,
    },

    // === Cluster Errors ===
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    // === Config / Scenario Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    ///
    /// `NodeUnavailable` clears once reachability changes and a
    /// `ConflictUnresolved` read can be retried after anti-entropy.
    /// `QuorumUnavailable` is terminal for the operation that hit it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NodeUnavailable(_) | Error::ConflictUnresolved(_)
        )
    }

    /// Is this error fatal for the node it names?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ClockSkewViolation { .. })
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
