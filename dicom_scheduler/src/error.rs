use dicom_jobs_api::{FailureReason, JobKind};
use std::time::Duration;

/// Failure of a DICOM network operation reported by a [crate::Transport].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection to {host}:{port} refused")]
    ConnectionRefused { host: String, port: u16 },
    #[error("association rejected: {0}")]
    AssociationRejected(String),
    #[error("DICOM protocol error: {0}")]
    Protocol(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The remote node does not support the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// The operation observed its [crate::CancelToken].
    #[error("operation canceled")]
    Canceled,
}

impl TransportError {
    /// Whether the scheduler may retry the job after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Unsupported(_) | TransportError::Canceled)
    }

    /// The reason reported to subscribers once no retry is left.
    pub fn to_failure_reason(&self) -> FailureReason {
        match self {
            TransportError::Unsupported(what) => FailureReason::NotImplemented(what.clone()),
            e => FailureReason::Transport(e.to_string()),
        }
    }
}

/// Failure to write response sets to a [crate::Catalog].
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("catalog storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to load a [crate::SchedulerConfig].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Misuse of [crate::Worker::set_job].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker is already bound to job {0}")]
    AlreadyBound(String),
    #[error("a {worker:?} worker cannot run a {job:?} job")]
    KindMismatch { worker: JobKind, job: JobKind },
}
