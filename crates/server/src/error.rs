//! API error types.
//!
//! Errors render as the OSB error body: `{"error": <CamelCode>,
//! "description": <message>}`. Unexpected store or provider failures are
//! logged with their cause but surface as opaque internal errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use basin_provider::ProviderError;
use basin_store::StoreError;
use serde::Serialize;

/// OSB error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable description.
    pub description: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{description}")]
    Unprocessable { error: String, description: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl ApiError {
    /// 422 with a machine-readable code.
    pub fn unprocessable(error: &str, description: &str) -> Self {
        Self::Unprocessable {
            error: error.to_string(),
            description: description.to_string(),
        }
    }

    /// The request is missing `accepts_incomplete=true`.
    pub fn async_required() -> Self {
        Self::unprocessable(
            "AsyncRequired",
            "The query parameter accepts_incomplete=true MUST be included in the request.",
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::NotFound => ErrorResponse {
                error: None,
                description: "Not Found".to_string(),
            },
            Self::Conflict(description) => ErrorResponse {
                error: Some("Conflict".to_string()),
                description: description.clone(),
            },
            Self::Unprocessable { error, description } => ErrorResponse {
                error: Some(error.clone()),
                description: description.clone(),
            },
            // The cause is in the log, not the response.
            Self::Internal(_) | Self::Store(_) | Self::Provider(_) => {
                if status == StatusCode::NOT_FOUND {
                    ErrorResponse {
                        error: None,
                        description: "Not Found".to_string(),
                    }
                } else if status == StatusCode::CONFLICT {
                    ErrorResponse {
                        error: Some("Conflict".to_string()),
                        description: self.to_string(),
                    }
                } else {
                    tracing::error!(error = %self, "request failed");
                    ErrorResponse {
                        error: None,
                        description: "Internal Server Error".to_string(),
                    }
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
