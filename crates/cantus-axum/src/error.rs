//! Axum-specific error type and mappings.
//!
//! Every 4xx/5xx response body is `{error, error_kind, details?}`; the
//! request-id middleware injects the `request_id` field and the
//! `X-Request-ID` header on the way out, so handlers never thread the
//! id through by hand.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use cantus_core::error::{CatalogError, ErrorKind, RepositoryError, ValidationError};
use cantus_core::ports::{AudioError, QueueError, SynthesisError, TranscodeError};

/// HTTP-surface error: a taxonomy kind plus a short user-facing message.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct HttpError {
    pub kind: ErrorKind,
    pub message: String,
    /// Field-level validation details, when the kind warrants them.
    pub details: Vec<ValidationError>,
}

impl HttpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{what} not found"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The gateway is draining; new jobs are refused.
    pub fn shutting_down() -> Self {
        Self::new(ErrorKind::CircuitOpen, "service is shutting down")
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ValidationError> for HttpError {
    fn from(err: ValidationError) -> Self {
        Self {
            kind: ErrorKind::ValidationError,
            message: err.to_string(),
            details: vec![err],
        }
    }
}

impl From<RepositoryError> for HttpError {
    fn from(err: RepositoryError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<CatalogError> for HttpError {
    fn from(err: CatalogError) -> Self {
        let kind = err.kind();
        match err {
            CatalogError::Validation(inner) => inner.into(),
            other => Self::new(kind, other.to_string()),
        }
    }
}

impl From<SynthesisError> for HttpError {
    fn from(err: SynthesisError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<AudioError> for HttpError {
    fn from(err: AudioError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<TranscodeError> for HttpError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::Unavailable(format) => Self::new(
                ErrorKind::ValidationError,
                format!("format '{format}' is not available on this host"),
            ),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<QueueError> for HttpError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed => Self::shutting_down(),
            QueueError::Internal(message) => Self::internal(message),
        }
    }
}

/// JSON error response body. The `request_id` field is appended by the
/// request-id middleware.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_kind: ErrorKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<ValidationError>,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.message,
            error_kind: self.kind,
            details: self.details,
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            HttpError::new(ErrorKind::ValidationError, "x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(HttpError::not_found("job").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpError::new(ErrorKind::Forbidden, "x").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            HttpError::new(ErrorKind::Timeout, "x").status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            HttpError::shutting_down().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn validation_error_carries_details() {
        let err: HttpError =
            ValidationError::unknown_value("mode", "psychic", vec!["preset".to_string()]).into();
        assert_eq!(err.kind, ErrorKind::ValidationError);
        assert_eq!(err.details.len(), 1);
        assert_eq!(err.details[0].field, "mode");
    }
}
