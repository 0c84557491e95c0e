//! Error types for failcheck core.

use std::io;
use thiserror::Error;

/// Result type for local log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for the generator loop.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Result type for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors raised by the local log.
///
/// All of these are fatal to the operation that hit them: the local log is
/// the ground truth and is never written or read on a best-effort basis.
#[derive(Debug, Error)]
pub enum LogError {
    /// An I/O error occurred.
    #[error("local log I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized.
    #[error("could not encode record {id}: {source}")]
    Encode {
        /// Identifier of the record.
        id: i64,
        /// Underlying serializer error.
        source: serde_json::Error,
    },

    /// A complete entry could not be decoded.
    #[error("decode error after {count} records: {source}")]
    Decode {
        /// Number of records read successfully before the bad entry.
        count: u64,
        /// Underlying parser error.
        source: serde_json::Error,
    },

    /// The log handle was already closed.
    #[error("local log is closed")]
    Closed,
}

/// Errors raised by a remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Could not open a connection.
    #[error("could not connect: {0}")]
    Connect(String),

    /// A statement or transaction control command failed.
    #[error("{context}: {message}")]
    Query {
        /// What was being done.
        context: String,
        /// Driver message.
        message: String,
        /// Whether the connection is unusable afterwards.
        connection_lost: bool,
    },

    /// The per-operation timeout expired.
    #[error("remote operation timed out")]
    Timeout,

    /// The operation was interrupted by a stop request.
    #[error("remote operation cancelled")]
    Cancelled,

    /// The session was already closed.
    #[error("remote session is closed")]
    Closed,
}

impl RemoteError {
    /// Creates a query error on a connection that is still usable.
    pub fn query(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            context: context.into(),
            message: message.into(),
            connection_lost: false,
        }
    }

    /// Creates a query error that also lost the connection.
    pub fn connection_lost(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            context: context.into(),
            message: message.into(),
            connection_lost: true,
        }
    }

    /// Returns true if the session must be dropped and reopened.
    ///
    /// A timed-out or cancelled call leaves the session in an unknown state,
    /// so those count as lost too.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            RemoteError::Query {
                connection_lost, ..
            } => *connection_lost,
            RemoteError::Connect(_)
            | RemoteError::Timeout
            | RemoteError::Cancelled
            | RemoteError::Closed => true,
        }
    }
}

/// Invalid operator settings, reported before any work starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Payload size must be at least one byte.
    #[error("invalid size for payload: {0} (must be positive and addressable)")]
    InvalidPayloadSize(i64),

    /// A duration string could not be parsed.
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Remote operations need a non-zero timeout.
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Errors that stop the generator loop.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The local log could not be opened or appended to.
    #[error("could not store data: {0}")]
    Log(#[from] LogError),

    /// Settings were rejected before the loop started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The local log could not be replayed.
    #[error("local log error: {0}")]
    Log(#[from] LogError),

    /// The remote store failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Settings were rejected before the run started.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_lost_classification() {
        assert!(!RemoteError::query("insert", "duplicate key").is_connection_lost());
        assert!(RemoteError::connection_lost("insert", "broken pipe").is_connection_lost());
        assert!(RemoteError::Timeout.is_connection_lost());
        assert!(RemoteError::Cancelled.is_connection_lost());
        assert!(RemoteError::Closed.is_connection_lost());
    }

    #[test]
    fn error_display() {
        let err = RemoteError::query("could not get next id", "relation does not exist");
        assert_eq!(
            err.to_string(),
            "could not get next id: relation does not exist"
        );

        let err = ConfigError::InvalidPayloadSize(0);
        assert!(err.to_string().contains("must be positive"));
    }
}
