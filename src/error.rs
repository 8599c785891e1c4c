use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

/// A single offending input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Provider-side detail attached to an error response. It is logged always
/// and only copied into the body outside of production (see `response`).
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

/// ApiError
///
/// Every failure a handler can surface. Validation and authorization errors
/// are raised locally before any provider call; provider failures carry their
/// detail separately from the client-facing message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Reserved for uniqueness violations.
    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Provider { message: String, detail: String },

    #[error("{message}")]
    Internal { message: String, detail: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_fields(message: impl Into<String>, fields: Vec<FieldError>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn provider(message: impl Into<String>, detail: impl ToString) -> Self {
        ApiError::Provider {
            message: message.into(),
            detail: detail.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>, detail: impl ToString) -> Self {
        ApiError::Internal {
            message: message.into(),
            detail: detail.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Provider { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let mut body = json!({
            "success": false,
            "message": message,
        });

        if let ApiError::Validation { fields, .. } = &self {
            if !fields.is_empty() {
                body["errors"] = json!(fields);
            }
        }

        let detail = match self {
            ApiError::Provider { detail, .. } | ApiError::Internal { detail, .. } => {
                tracing::error!(status = %status, message = %message, detail = %detail, "request failed");
                Some(detail)
            }
            other => {
                tracing::debug!(status = %status, error = %other, "request rejected");
                None
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(ErrorDetail(detail));
        }
        response
    }
}
