//! Worker client error types

use serde_json::Value;
use thiserror::Error;

/// Result type alias for worker client operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors surfaced by the worker client
#[derive(Debug, Error, Clone)]
pub enum WorkerError {
    /// The worker process could not be launched
    #[error("Failed to start worker: {message}")]
    Startup { message: String },

    /// A line from the worker could not be understood
    ///
    /// Only produced inside the response reader, where it is logged and
    /// skipped. It never reaches a caller of `call`.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The worker answered with an `error` object
    #[error("Worker error for {method}: {message}")]
    Remote {
        method: String,
        message: String,
        code: Option<String>,
        details: Value,
    },

    /// The caller's cancellation token fired before a response arrived
    #[error("Call cancelled: {method}")]
    Cancelled { method: String },

    /// The worker exited, closed its output stream, or the client was shut down
    #[error("Worker terminated: {reason}")]
    Terminated { reason: String },

    /// A typed operation received a result of the wrong shape
    #[error("Unexpected result for {method}: {message}")]
    UnexpectedResult { method: String, message: String },

    /// The correlation table already holds a waiter for this id
    #[error("Duplicate request id: {id}")]
    DuplicateRequestId { id: String },

    /// I/O error while talking to the worker
    #[error("IO error: {message}")]
    Io { message: String },

    /// Request params cannot be sent to the worker
    #[error("Invalid request params: {message}")]
    InvalidParams { message: String },

    /// Request encoding failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl WorkerError {
    /// Create a new Startup error
    pub fn startup(message: impl Into<String>) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }

    /// Create a new Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new Cancelled error
    pub fn cancelled(method: impl Into<String>) -> Self {
        Self::Cancelled {
            method: method.into(),
        }
    }

    /// Create a new Terminated error
    pub fn terminated(reason: impl Into<String>) -> Self {
        Self::Terminated {
            reason: reason.into(),
        }
    }

    /// Create a new UnexpectedResult error
    pub fn unexpected_result(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResult {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidParams error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Create a new Io error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the client can no longer be used after this error
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Startup { .. } | Self::Terminated { .. })
    }

    /// Whether this error was produced by the caller's own cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The message carried by a remote error, if this is one
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => {
                Self::terminated(format!("worker input closed: {}", err))
            }
            _ => Self::io(err.to_string()),
        }
    }
}
