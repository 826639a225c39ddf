//! Error types for kanon.
//!
//! All errors in kanon are strongly typed using thiserror.
//! This enables pattern matching on specific error conditions
//! and provides clear error messages.

use thiserror::Error;

use crate::record::RecordId;

/// Validation errors raised while vetting raw records and configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Record {record_id} has no usable legal name")]
    MissingName {
        record_id: RecordId,
    },

    #[error("Record {record_id} has a name but neither city nor website domain")]
    MissingLocationSignal {
        record_id: RecordId,
    },

    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: String,
    },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    FieldTooLong {
        field: String,
        max_length: usize,
    },

    #[error("Invalid field weights: {reason}")]
    InvalidWeights {
        reason: String,
    },

    #[error("Invalid thresholds: {reason}")]
    InvalidThresholds {
        reason: String,
    },

    #[error("Invalid engine config: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Pipeline errors raised during a resolution run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Scoring failed for pair ({record_a}, {record_b}): {reason}")]
    Scoring {
        record_a: RecordId,
        record_b: RecordId,
        reason: String,
    },

    /// Fatal. The run must abort without committing partial merges.
    #[error("Cluster state corrupted: {reason}")]
    ClusterCorruption {
        reason: String,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Group worker pool failed: {reason}")]
    WorkerPool {
        reason: String,
    },
}

/// Errors from the external suppression (RTBF) store.
#[derive(Debug, Error)]
pub enum SuppressionError {
    #[error("Suppression store timed out after {waited_ms}ms")]
    Timeout {
        waited_ms: u64,
    },

    #[error("Suppression store unavailable: {reason}")]
    Unavailable {
        reason: String,
    },

    #[error("Suppression store failure: {reason}")]
    Internal {
        reason: String,
    },
}

/// Errors from the external manual-review queue.
#[derive(Debug, Error)]
pub enum ReviewQueueError {
    #[error("Review queue unavailable: {reason}")]
    Unavailable {
        reason: String,
    },

    #[error("Review queue timed out after {waited_ms}ms")]
    Timeout {
        waited_ms: u64,
    },
}

/// Top-level error type for kanon.
///
/// This enum encompasses all possible errors that can occur
/// when running the resolution engine.
#[derive(Debug, Error)]
pub enum KanonError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Suppression error: {0}")]
    Suppression(#[from] SuppressionError),

    #[error("Review queue error: {0}")]
    ReviewQueue(#[from] ReviewQueueError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl KanonError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a pipeline error.
    #[must_use]
    pub const fn is_pipeline(&self) -> bool {
        matches!(self, Self::Pipeline(_))
    }

    /// Returns true if this is a suppression-store error.
    #[must_use]
    pub const fn is_suppression(&self) -> bool {
        matches!(self, Self::Suppression(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Retryable errors come from external collaborators (suppression
    /// store, review queue) and are expected to clear on their own.
    /// Re-running the same batch after a retryable failure converges
    /// because upserts are idempotent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false, // Re-sending the same record won't help
            Self::Pipeline(_) => false,
            Self::Suppression(e) => matches!(
                e,
                SuppressionError::Timeout { .. } | SuppressionError::Unavailable { .. }
            ),
            Self::ReviewQueue(_) => true,
            Self::Internal { .. } => false,
        }
    }

    /// Returns true if this error must abort the run without committing.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Pipeline(PipelineError::ClusterCorruption { .. })
        )
    }
}

/// Result type alias for kanon operations.
pub type KanonResult<T> = Result<T, KanonError>;
