//! Error types for the AETOS core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the reasoning service, ingestion, storage, and configuration
//! domains.

use std::path::PathBuf;

/// Top-level error type for the AETOS core library.
#[derive(Debug, thiserror::Error)]
pub enum AetosError {
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the reasoning service adapter.
///
/// Transient variants (`RateLimited`, `Timeout`, `Connection`, `ApiRequest`,
/// `ResponseParse`, `EmptyResponse`) are retried and eventually degraded to a
/// sentinel result; `AuthFailed` is a configuration failure and aborts
/// immediately.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("API returned no usable text")]
    EmptyResponse,

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Rate limited by reasoning service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Connection to reasoning service failed: {message}")]
    Connection { message: String },
}

impl AnalysisError {
    /// Whether the error is transient and worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, AnalysisError::AuthFailed { .. })
    }
}

/// Errors from the document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open document store at {path}: {message}")]
    OpenFailed { path: PathBuf, message: String },

    #[error("Store operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Record encoding failed: {message}")]
    Encoding { message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::OperationFailed {
            message: e.to_string(),
        }
    }
}

/// Errors from the ingestion adapters.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{source_name} request failed: {message}")]
    RequestFailed {
        source_name: String,
        message: String,
    },

    #[error("{source_name} returned status {status}")]
    BadStatus { source_name: String, status: u16 },

    #[error("{source_name} response could not be parsed: {message}")]
    ParseFailed {
        source_name: String,
        message: String,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `AetosError`.
pub type Result<T> = std::result::Result<T, AetosError>;
