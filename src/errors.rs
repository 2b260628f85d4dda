use crate::services::storage_service::StorageError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use std::fmt;

/// Machine-readable error codes returned in the `error` field of error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    IncompleteObject,
    StorageError,
    TransformError,
    RangeNotSupported,
    RateLimited,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::IncompleteObject => "INCOMPLETE_OBJECT",
            Self::StorageError => "STORAGE_ERROR",
            Self::TransformError => "TRANSFORM_ERROR",
            Self::RangeNotSupported => "RANGE_NOT_SUPPORTED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::IncompleteObject => StatusCode::NOT_FOUND,
            Self::RangeNotSupported => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::StorageError | Self::TransformError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// A client-facing error. The message is safe to expose; internal details
/// are logged where the error is created and never copied in here.
#[derive(Debug)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "Object not found")
    }

    pub fn incomplete_object() -> Self {
        Self::new(ErrorCode::IncompleteObject, "Object is incomplete")
    }

    pub fn storage() -> Self {
        Self::new(ErrorCode::StorageError, "Failed to read from storage")
    }

    pub fn transform() -> Self {
        Self::new(ErrorCode::TransformError, "Failed to deliver transformed object")
    }

    pub fn range_not_supported() -> Self {
        Self::new(
            ErrorCode::RangeNotSupported,
            "Range requests cannot be combined with image transformations",
        )
    }

    pub fn rate_limited() -> Self {
        Self::new(ErrorCode::RateLimited, "Too many requests")
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError, "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code.as_str(),
            "message": self.message,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }));

        let mut response = (self.code.status(), body).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "storage error");
        AppError::storage()
    }
}
