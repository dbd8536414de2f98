use thiserror::Error;
use uuid::Uuid;

use crate::relmon::JobStatus;

#[derive(Error, Debug)]
pub enum RelmonError {
    #[error("RelMon not found: {0}")]
    JobNotFound(Uuid),

    #[error("RelMon named {0:?} already exists")]
    DuplicateName(String),

    #[error("Invalid RelMon: {0}")]
    InvalidJob(String),

    #[error("RelMon {id} is {status}, refusing update")]
    UnexpectedStatus { id: Uuid, status: JobStatus },

    #[error("Secret mismatch for RelMon {0}")]
    SecretMismatch(Uuid),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Malformed file name: {0:?}")]
    MalformedFileName(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Remote operation timed out after {secs}s: {operation}")]
    RemoteTimeout { operation: String, secs: u64 },

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelmonError>;
