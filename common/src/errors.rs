//! Error types shared by every layer of the service.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
///
/// Driver failures keep the driver's own message so callers see exactly what
/// the server reported.
#[derive(Debug, Error)]
pub enum AppError {
    /// Opening a connection to the server failed (network, auth, TLS).
    #[error("{0}")]
    DatabaseConnection(String),

    /// A statement failed on an open connection.
    #[error("{0}")]
    DatabaseQuery(String),

    /// No connection configuration is registered under the given id.
    #[error("Connection configuration not found for id: {0}")]
    ConnectionNotFound(String),

    /// Input was rejected before any side effect happened.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The config store or the secret store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DatabaseConnection(_) => "CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "QUERY_ERROR",
            AppError::ConnectionNotFound(_) => "CONFIG_NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used when the error crosses the API boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DatabaseConnection(_) | AppError::DatabaseQuery(_) => StatusCode::BAD_GATEWAY,
            AppError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error came from the database server or the network path to it.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseConnection(_) | AppError::DatabaseQuery(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(format!("malformed store contents: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
