//! Error taxonomy for the access layer

use strand_core::HostError;
use thiserror::Error;

use crate::modifier::ModifierState;

/// Errors surfaced by wrappers, plugs and modifiers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The node this wrapper or plug refers to has been destroyed
    #[error("{path} no longer exists")]
    Existence { path: String },

    /// Attribute or path lookup found nothing
    #[error("{path} not found")]
    NotFound { path: String },

    /// A name that must be unique is already taken
    #[error("{path} already exists")]
    Duplicate { path: String },

    /// Write, delete or rename refused because of a lock
    #[error("{path} is locked")]
    Locked { path: String },

    #[error("connection failed: {0}")]
    Connection(String),

    /// Value does not fit the attribute, or an option makes no sense for it
    #[error("{path}: {reason}")]
    Type { path: String, reason: String },

    #[error(transparent)]
    Modifier(#[from] ModifierError),

    /// An operation was queued on a modifier that is no longer building
    #[error("modifier is already {0:?}")]
    ModifierClosed(ModifierState),

    #[error("host version {version} is older than the minimum {minimum}")]
    UnsupportedHost { version: u32, minimum: u32 },

    #[error("host error: {0}")]
    Host(HostError),
}

impl From<HostError> for Error {
    fn from(e: HostError) -> Self {
        match e {
            HostError::InvalidHandle(path) => Error::Existence { path },
            HostError::StaleAttribute(path) | HostError::NotFound(path) => Error::NotFound { path },
            HostError::Duplicate(path) => Error::Duplicate { path },
            HostError::Locked(path) => Error::Locked { path },
            HostError::TypeMismatch { path, expected, got } => Error::Type {
                path,
                reason: format!("expected {}, got {}", expected, got),
            },
            HostError::Connection(msg) => Error::Connection(msg),
            other => Error::Host(other),
        }
    }
}

impl Error {
    /// The innermost cause, looking through modifier failures
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Modifier(m) => m.cause.root_cause(),
            other => other,
        }
    }

    pub(crate) fn into_host(self) -> HostError {
        match self {
            Error::Host(e) => e,
            other => HostError::Callback(other.to_string()),
        }
    }
}

/// A batch operation failed
///
/// Carries every operation attempted up to and including the failing one.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{cause}; these tasks were attempted:\n{}", format_history(.history))]
pub struct ModifierError {
    pub history: Vec<String>,
    pub cause: Box<Error>,
    /// Whether the operations applied before the failure were reverted
    pub rolled_back: bool,
}

impl ModifierError {
    pub fn new(history: Vec<String>, cause: Error, rolled_back: bool) -> Self {
        Self {
            history,
            cause: Box::new(cause),
            rolled_back,
        }
    }
}

fn format_history(history: &[String]) -> String {
    history
        .iter()
        .map(|entry| format!("- {}", entry))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for access-layer operations
pub type Result<T> = std::result::Result<T, Error>;
