//! # Error Handling and Response Types
//!
//! Every handler returns [`AppResult`]. Failures are rendered as one JSON shape:
//!
//! ```json
//! {
//!   "error": "package requests version 2.25.1 already exists",
//!   "code": "conflict",
//!   "details": {"package": "requests", "version": "2.25.1"},
//!   "timestamp": "2024-01-01T12:00:00+00:00"
//! }
//! ```
//!
//! ## Error Classifications
//!
//! - **Validation Errors** (400): bad forms, filenames without metadata
//! - **Not Found** (404): unknown packages or files
//! - **Conflict** (409): the package version is already recorded
//! - **Upload Errors** (413): oversized uploads
//! - **Unavailable** (503): store timeouts, throttling, write contention
//! - **Internal Errors** (500): everything else

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pail_catalog::{CatalogError, StoreError};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    UploadError,
    Unavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::UploadError => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("package {name} version {version} already exists")]
    Conflict { name: String, version: String },

    #[error("{0}")]
    UploadError(String),

    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorCode::UploadError
            }
            AppError::BadRequest(_) | AppError::Multipart(_) => ErrorCode::ValidationError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict { .. } => ErrorCode::Conflict,
            AppError::UploadError(_) => ErrorCode::UploadError,
            AppError::Unavailable(_) => ErrorCode::Unavailable,
            AppError::Config(_) | AppError::InternalError(_) | AppError::Anyhow(_) => {
                ErrorCode::InternalError
            }
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Conflict { name, version } => {
                Some(json!({"package": name, "version": version}))
            }
            AppError::Anyhow(e) => e
                .source()
                .map(|source| json!({"source": source.to_string()})),
            _ => None,
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        ApiErrorResponse {
            error: self.to_string(),
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => AppError::NotFound(format!("Object not found: {key}")),
            e if e.is_transient() => AppError::Unavailable(e.to_string()),
            e => AppError::InternalError(e.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::AlreadyExists { name, version } => AppError::Conflict { name, version },
            CatalogError::Unparsable(e) => AppError::BadRequest(e.to_string()),
            CatalogError::Store(e) => e.into(),
            e @ CatalogError::Contention { .. } => AppError::Unavailable(e.to_string()),
            e => AppError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_response = self.to_error_response();
        let status = self.error_code().http_status();

        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "Request failed");
        } else {
            tracing::warn!(error = %self, status = %status, "Request rejected");
        }
        tracing::debug!(code = %error_response.code, "Returning standardized error response");

        (status, axum::Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
