//! Error types for mint-analytics
//!
//! This module defines the error hierarchy for:
//! - HTTP-facing failures (mapped onto 400/404/500 with a `detail` body)
//! - Configuration and CLI validation
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Surface the underlying engine message verbatim in `detail`
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Bind address could not be parsed
    #[error("Invalid bind address '{addr}': {reason}")]
    InvalidBindAddress { addr: String, reason: String },

    /// Port zero is not a usable listen port
    #[error("Invalid port {0}: must be between 1 and 65535")]
    InvalidPort(u16),

    /// CORS origin is not a valid header value
    #[error("Invalid CORS origin '{origin}': {reason}")]
    InvalidCorsOrigin { origin: String, reason: String },

    /// Data directory path exists but is not a directory
    #[error("Invalid data directory '{path}': {reason}")]
    InvalidDataDir { path: PathBuf, reason: String },
}

/// Analytics server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// DataFusion query or planning error
    #[error("{0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Arrow error
    #[error("{0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON serialization error
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Spreadsheet writer error
    #[cfg(feature = "excel")]
    #[error("{0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Input file passed to the loader does not exist
    #[error("File not found")]
    FileNotFound(PathBuf),

    /// Column is not part of the loaded table
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    /// Table holds no rows, or a filter matched nothing
    #[error("{0}")]
    NoData(String),

    /// Malformed `filters` parameter
    #[error("invalid filter format")]
    InvalidFilter,

    /// Malformed query parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Nothing has been loaded into the store yet
    #[error("No dataset loaded: table 'data' does not exist")]
    NoDataset,

    /// Store was closed during shutdown
    #[error("Data store is closed")]
    StoreClosed,

    /// Export format not compiled into this build
    #[error("{0} export is not available in this build")]
    ExportUnavailable(&'static str),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl ServerError {
    /// HTTP status for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            ServerError::FileNotFound(_)
            | ServerError::ColumnNotFound(_)
            | ServerError::NoData(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidFilter | ServerError::InvalidParameter(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }

        let body = serde_json::json!({ "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type alias for ServerError
pub type ServerResult<T> = std::result::Result<T, ServerError>;
