//! API error types and handling for the SmartHealth REST API.
//!
//! Every failure is rendered as a JSON [`ErrorResponse`] with a status code
//! chosen from the domain error taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use smarthealth_core::{CoreError, StorageError};

/// API error type that converts to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No caller could be resolved (401)
    #[error("Authentication required: {message}")]
    Unauthenticated { message: String },

    /// A device presented an unknown identity key (403)
    #[error("Invalid API Key")]
    InvalidApiKey,

    /// The caller may not perform this action (403)
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// The request body could not be understood (400)
    #[error("{message}")]
    BadRequest { message: String },

    /// Resource not found (404)
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    /// Wrong HTTP method (405)
    #[error("Invalid request method")]
    MethodNotAllowed,

    /// Conflict with existing state (409)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Internal server error (500)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidApiKey | Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "UNAUTHENTICATED",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication => Self::InvalidApiKey,
            CoreError::MalformedPayload { message } => Self::BadRequest { message },
            CoreError::NotFound { resource_type, id } => Self::NotFound {
                resource_type: resource_type.to_string(),
                id,
            },
            CoreError::Forbidden { message } => Self::Forbidden { message },
            CoreError::Unauthenticated { message } => Self::Unauthenticated { message },
            e @ CoreError::NoResponderConfigured { .. } => Self::Conflict {
                message: e.to_string(),
            },
            CoreError::Storage(StorageError::Conflict { message }) => Self::Conflict { message },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        CoreError::from(err).into()
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: &'static str,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Additional error details.
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    /// Resource type involved
    pub resource_type: String,
    /// Resource ID involved
    pub resource_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();
        let message = self.to_string();

        let details = match &self {
            ApiError::NotFound { resource_type, id } => Some(ErrorDetails {
                resource_type: resource_type.clone(),
                resource_id: id.clone(),
            }),
            _ => None,
        };

        match &self {
            ApiError::Internal { .. } => tracing::error!(error = %self, "API error"),
            _ => tracing::warn!(error = %self, "API error"),
        }

        let body = ErrorResponse {
            status: "error",
            code,
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
