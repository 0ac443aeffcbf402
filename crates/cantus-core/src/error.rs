//! Error taxonomy shared by logs, job records and HTTP payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The uniform failure classification.
///
/// Every failure that reaches a job record or an HTTP error payload is one
/// of these kinds; free-form detail rides alongside as a message string.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    Conflict,
    Forbidden,
    OutOfMemory,
    TransientBackend,
    Timeout,
    CircuitOpen,
    Cancelled,
    Abandoned,
    Internal,
}

impl ErrorKind {
    /// HTTP status for kinds that surface through the API.
    ///
    /// `cancelled` and `abandoned` are terminal job states rather than
    /// response classes; they map to 500 in the unlikely case one leaks
    /// into a response.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Forbidden => 403,
            Self::Timeout => 504,
            Self::CircuitOpen => 503,
            Self::OutOfMemory
            | Self::TransientBackend
            | Self::Cancelled
            | Self::Abandoned
            | Self::Internal => 500,
        }
    }

    /// Whether the worker may retry this failure in place.
    #[must_use]
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::OutOfMemory | Self::TransientBackend | Self::Timeout
        )
    }
}

/// A rejected inbound parameter.
///
/// Carries the offending field and, for enum coercions, the accepted set,
/// so clients can self-correct without consulting documentation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<Vec<String>>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            accepted: None,
        }
    }

    /// Rejection of an unknown enum value, listing what would have been
    /// accepted.
    pub fn unknown_value(
        field: impl Into<String>,
        value: &str,
        accepted: Vec<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: format!("unknown value '{value}'"),
            accepted: Some(accepted),
        }
    }

    pub fn out_of_range(field: impl Into<String>, range: &str) -> Self {
        Self {
            field: field.into(),
            message: format!("must be within {range}"),
            accepted: None,
        }
    }
}

/// Errors surfaced by the job repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No record with the given id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A state transition the job state machine does not admit.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record could not be encoded/decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// Wire classification of this failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidTransition(_) => ErrorKind::Conflict,
            Self::Storage(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Errors surfaced by the voice and quality profile catalogs.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Mutation of a built-in profile.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Referential integrity or uniqueness violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }
}
