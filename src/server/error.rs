use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::query::SchemaError;

/// API error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{message}")]
    UnsupportedFiles {
        message: String,
        filenames: Vec<String>,
    },

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Upstream(String),
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsupported: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, unsupported) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::UnsupportedFiles { message, filenames } => (
                StatusCode::BAD_REQUEST,
                "unsupported_file_type",
                message,
                Some(filenames),
            ),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg, None)
            }
            ApiError::RateLimited(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                msg,
                None,
            ),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg, None),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            unsupported,
        });

        (status, body).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(rejection.body_text());
        }
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        if err.is_rate_limited() {
            ApiError::RateLimited(err.to_string())
        } else {
            ApiError::Upstream(err.to_string())
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Unsupported { ref filenames, .. } => ApiError::UnsupportedFiles {
                message: err.to_string(),
                filenames: filenames.clone(),
            },
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
