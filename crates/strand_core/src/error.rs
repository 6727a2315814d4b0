//! Errors reported across the host boundary

use thiserror::Error;

/// Failure reported by a [`Host`](crate::Host) implementation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("stale attribute handle on {0}")]
    StaleAttribute(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Duplicate(String),

    #[error("locked: {0}")]
    Locked(String),

    #[error("type mismatch on {path}: expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("connection refused: {0}")]
    Connection(String),

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("callback failed: {0}")]
    Callback(String),
}

pub type HostResult<T> = Result<T, HostError>;
