//! API error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use botsentry_core::RemediationError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error returned by API handlers, rendered as `{"error": CODE, "message": ...}`
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<botsentry_common::Error> for ApiError {
    fn from(e: botsentry_common::Error) -> Self {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", e);
            return Self::new(status, e.code(), "Internal server error");
        }
        Self::new(status, e.code(), e.to_string())
    }
}

impl From<RemediationError> for ApiError {
    fn from(e: RemediationError) -> Self {
        match e {
            RemediationError::Storage(inner) => inner.into(),
            other => Self::new(
                StatusCode::from_u16(other.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
                other.code(),
                other.to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botsentry_common::types::AlertStatus;

    #[test]
    fn test_remediation_errors_map_to_status() {
        let e: ApiError = RemediationError::AlreadyResolved(AlertStatus::Approved).into();
        assert_eq!(e.status, StatusCode::CONFLICT);
        assert_eq!(e.message, "Alert already approved");

        let e: ApiError = RemediationError::InvalidToken.into();
        assert_eq!(e.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_server_errors_hide_details() {
        let e: ApiError = botsentry_common::Error::Database("connection reset".into()).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.message, "Internal server error");
    }
}
