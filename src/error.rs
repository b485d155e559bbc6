//! Error types for rlduels operations.
//!
//! Defines error types for the subsystems shared across modules:
//! - Pair construction
//! - Record store access
//! - Environment simulation
//! - Trajectory rendering

use thiserror::Error;

use crate::trajectory::PairId;

/// Errors raised while building a trajectory pair.
#[derive(Debug, Error)]
pub enum PairError {
    #[error("Trajectories come from different environments: '{first}' and '{second}'")]
    EnvironmentMismatch { first: String, second: String },
}

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached. Safe to retry.
    #[error("Connection to the store failed: {0}")]
    ConnectionFailure(String),

    /// A write failed and its effect is unknown.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No record matches the identifier.
    #[error("No entry found with id {0}")]
    NotFound(PairId),

    /// The record already holds the requested values.
    #[error("Entry {0} found but no update was needed")]
    NoOpUpdate(PairId),

    /// The update named no fields.
    #[error("No update fields provided")]
    EmptyUpdate,

    /// Stored payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConnectionFailure(_) | StoreError::Persistence(_))
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::ConnectionFailure(_) => "connection_failure",
            StoreError::Persistence(_) => "persistence",
            StoreError::NotFound(_) => "not_found",
            StoreError::NoOpUpdate(_) => "noop_update",
            StoreError::EmptyUpdate => "empty_update",
            StoreError::Serialization(_) => "serialization",
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::ConnectionFailure(err.to_string()),
            other => StoreError::Persistence(other.to_string()),
        }
    }
}

/// Errors raised by an environment.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("'{0}' is not a registered environment")]
    UnknownEnvironment(String),

    #[error("Invalid state: expected {expected} values, got {actual}")]
    InvalidState { expected: usize, actual: usize },

    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

/// Errors that can occur while rendering a trajectory.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("The frame sequence is empty; cannot generate video")]
    EmptyFrameSequence,

    #[error("Frame {index} has shape {found:?}, expected {expected}")]
    InvalidFrameShape {
        index: usize,
        expected: String,
        found: Vec<usize>,
    },

    #[error("Environment error: {0}")]
    Environment(#[from] EnvError),

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_retryable() {
        assert!(StoreError::ConnectionFailure("refused".into()).is_retryable());
        assert!(StoreError::Persistence("disk".into()).is_retryable());
        assert!(!StoreError::NotFound(PairId(1)).is_retryable());
        assert!(!StoreError::NoOpUpdate(PairId(1)).is_retryable());
    }

    #[test]
    fn test_sqlx_error_mapping() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::ConnectionFailure(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Persistence(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::NotFound(PairId(42));
        assert!(err.to_string().contains("42"));
        assert_eq!(err.kind(), "not_found");

        let err = RenderError::InvalidFrameShape {
            index: 3,
            expected: "HxWx3".to_string(),
            found: vec![10, 10, 4],
        };
        assert!(err.to_string().contains("Frame 3"));
    }
}
