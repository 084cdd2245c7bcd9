//! The error taxonomy (spec §7), shared by every crate downstream of
//! ingestion so that HTTP status mapping stays in one place.
//!
//! Grounded on `capture::api::CaptureError` and
//! `hook_worker::error::{WebhookError, WorkerError}`: one `thiserror`
//! enum per concern, with an `IntoResponse` impl translating kinds to
//! status codes exactly like `CaptureError::into_response`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// A single error kind from the taxonomy in spec §7. Unlike `WalError`,
/// this has no payload — it's the stable, low-cardinality label used for
/// metrics (`{status=error, errorType=<kind>}`) and for categorizing
/// rollback reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidNamespace,
    NamespaceNotFound,
    Validation,
    Unauthorized,
    Forbidden,
    ProducerUnavailable,
    TargetSystemError,
    QueueError,
    DatabaseError,
    RateLimit,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidNamespace => "INVALID_NAMESPACE",
            ErrorKind::NamespaceNotFound => "NAMESPACE_NOT_FOUND",
            ErrorKind::Validation => "VALIDATION_FAILED",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::ProducerUnavailable => "PRODUCER_UNAVAILABLE",
            ErrorKind::TargetSystemError => "TARGET_SYSTEM_ERROR",
            ErrorKind::QueueError => "QUEUE_ERROR",
            ErrorKind::DatabaseError => "DATABASE_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Whether a caller may usefully retry after this error (spec §7 table).
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ProducerUnavailable
                | ErrorKind::TargetSystemError
                | ErrorKind::QueueError
                | ErrorKind::DatabaseError
                | ErrorKind::RateLimit
                | ErrorKind::Timeout
        )
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidNamespace | ErrorKind::NamespaceNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::ProducerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::TargetSystemError => StatusCode::BAD_GATEWAY,
            ErrorKind::QueueError | ErrorKind::DatabaseError | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Reason-string categorization used by the transaction orchestrator's
    /// rollback metric (spec §4.6): "timeout"→timeout, "producer"→
    /// producer_error, "validation"→validation_error,
    /// "connection"→connection_error, else unknown.
    pub fn categorize_reason(reason: &str) -> &'static str {
        let lower = reason.to_ascii_lowercase();
        if lower.contains("timeout") {
            "timeout"
        } else if lower.contains("producer") {
            "producer_error"
        } else if lower.contains("validation") {
            "validation_error"
        } else if lower.contains("connection") {
            "connection_error"
        } else {
            "unknown"
        }
    }
}

/// The concrete error type threaded through the ingestion pipeline.
/// Carries a kind (for status/metrics) plus a human-readable detail that
/// is never shown to the caller verbatim for infra-origin kinds, only
/// logged (spec §7 "Unknown exceptions from drivers are wrapped ...
/// with the original message preserved in `details`").
#[derive(Error, Debug)]
#[error("{kind:?}: {detail}")]
pub struct WalError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl WalError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn namespace_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NamespaceNotFound,
            format!("namespace '{name}' does not exist"),
        )
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, detail)
    }

    pub fn producer_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProducerUnavailable, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for WalError {
    fn into_response(self) -> Response {
        let status = self.kind.http_status();
        let body = ErrorBody {
            code: self.kind.as_str(),
            message: self.detail,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_spec_table() {
        assert_eq!(
            ErrorKind::NamespaceNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ErrorKind::Validation.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorKind::ProducerUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorKind::TargetSystemError.http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ErrorKind::Internal.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ErrorKind::RateLimit.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn reason_categorization() {
        assert_eq!(
            ErrorKind::categorize_reason("Transaction timeout - orphaned cleanup"),
            "timeout"
        );
        assert_eq!(
            ErrorKind::categorize_reason("producer failed to connect"),
            "producer_error"
        );
        assert_eq!(
            ErrorKind::categorize_reason("Commit failed: validation mismatch"),
            "validation_error"
        );
        assert_eq!(
            ErrorKind::categorize_reason("connection reset by peer"),
            "connection_error"
        );
        assert_eq!(ErrorKind::categorize_reason("gremlins"), "unknown");
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::ProducerUnavailable.retryable());
        assert!(ErrorKind::RateLimit.retryable());
        assert!(!ErrorKind::Validation.retryable());
        assert!(!ErrorKind::NamespaceNotFound.retryable());
    }
}
