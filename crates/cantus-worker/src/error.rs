//! Job failure: the worker-side bridge onto the error taxonomy.

use cantus_core::error::{CatalogError, ErrorKind, RepositoryError};
use cantus_core::ports::{AudioError, SynthesisError};

/// A terminal failure for one job, already classified.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "job deleted while processing")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<SynthesisError> for JobFailure {
    fn from(e: SynthesisError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<AudioError> for JobFailure {
    fn from(e: AudioError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<RepositoryError> for JobFailure {
    fn from(e: RepositoryError) -> Self {
        Self::new(ErrorKind::Internal, e.to_string())
    }
}

impl From<CatalogError> for JobFailure {
    fn from(e: CatalogError) -> Self {
        // A job referencing a profile that vanished between submission
        // and dequeue fails as a validation problem, not an internal one.
        let kind = match &e {
            CatalogError::NotFound(_) => ErrorKind::ValidationError,
            other => other.kind(),
        };
        Self::new(kind, e.to_string())
    }
}
