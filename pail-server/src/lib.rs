//! # Pail Package Index Server
//!
//! HTTP boundary around [`pail_catalog`]: it accepts `twine`-style uploads,
//! serves the PEP 503 simple index, redirects downloads to signed storage
//! URLs and answers the legacy XML-RPC `search` call.
//!
//! ## Routes
//!
//! - `GET /`, `GET /package/{package}`: human-readable pages
//! - `GET /simple/`, `GET /simple/{package}/`: simple repository API
//! - `POST /simple`, `POST /simple/`: uploads (`:action=file_upload`)
//! - `GET /api/{package}/{file}`: downloads
//! - `POST /pypi`, `POST /RPC2`: XML-RPC search
//! - `GET /health`, `GET /status`

pub mod backend;
pub mod config;
pub mod error;
pub mod server;
pub mod simple;
pub mod state;
pub mod ui;
pub mod xmlrpc;

pub use config::{Backend, Config, ConfigOverrides};
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use server::{build_router, run_server};
pub use state::{AppState, SuccessResponse};

/// Longest accepted upload filename.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Check that an uploaded filename is safe to use as the last segment of a
/// storage key.
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    if filename.trim().is_empty() {
        tracing::warn!("Empty filename provided");
        return Err(AppError::BadRequest("Filename cannot be empty".to_string()));
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        tracing::warn!(filename = %filename, length = %filename.len(), "Filename too long");
        return Err(AppError::BadRequest(format!(
            "Filename too long: {} characters (max: {MAX_FILENAME_LENGTH})",
            filename.len()
        )));
    }

    if filename.chars().any(|c| c.is_control()) {
        tracing::warn!(filename = %filename, "Control character detected in filename");
        return Err(AppError::BadRequest(
            "Filename contains control characters".to_string(),
        ));
    }

    if filename.contains("..") {
        tracing::warn!(filename = %filename, "Path traversal attempt detected (..)");
        return Err(AppError::BadRequest(
            "Filename contains parent directory reference (..)".to_string(),
        ));
    }

    if filename.contains('/') || filename.contains('\\') {
        tracing::warn!(filename = %filename, "Path separator detected in filename");
        return Err(AppError::BadRequest(
            "Filename contains path separators".to_string(),
        ));
    }

    if filename.starts_with('.') {
        tracing::warn!(filename = %filename, "Hidden filename rejected");
        return Err(AppError::BadRequest(
            "Filename cannot start with a dot".to_string(),
        ));
    }

    Ok(())
}
