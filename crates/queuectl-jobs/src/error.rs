//! Job error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// A job with this id already exists.
    #[error("Job already exists: {0}")]
    DuplicateId(String),

    /// The job description is malformed.
    #[error("Invalid job description: {0}")]
    InvalidJob(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid job state.
    #[error("Invalid job state for {id}: expected {expected}, got {actual}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },

    /// The caller's claim on the job is no longer current.
    #[error("Claim on job {0} is no longer held")]
    StaleClaim(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error outside the database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker or supervisor error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if the operation may succeed when attempted again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Database(_) | JobError::Io(_))
    }
}
