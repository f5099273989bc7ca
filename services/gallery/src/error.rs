//! Error taxonomy shared by the repositories, the catalog and the HTTP layer.
//!
//! Every failure is surfaced to the caller as plain text; nothing is retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors produced by gallery operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed local input, caught before any backend call
    #[error("{0}")]
    Validation(String),

    /// Record insert/select/delete rejected by the database
    #[error("{0}")]
    Persistence(String),

    /// Object upload/removal rejected by the object store
    #[error("{0}")]
    Storage(String),

    /// Lookup yielded no match
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// QR code could not be encoded or rendered
    #[error("{0}")]
    Render(String),

    /// Server-side fault unrelated to the request's input
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    /// Stable machine-readable code returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Persistence(_) => "PERSISTENCE_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidCredentials => "INVALID_CREDENTIALS",
            Error::Render(_) => "RENDER_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Storage(_) => StatusCode::BAD_GATEWAY,
            Error::Persistence(_) | Error::Render(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => Error::Persistence(db.message().to_string()),
            other => Error::Persistence(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        let err = Error::validation("Please enter a folder name.");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.to_string(), "Please enter a folder name.");

        assert_eq!(Error::not_found("Event not found").status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Storage("denied".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_fault_is_server_error() {
        let err = Error::Internal("Failed to hash password: salt too short".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(err.status().is_server_error());
    }

    #[test]
    fn test_row_not_found_maps_to_persistence() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
    }
}
