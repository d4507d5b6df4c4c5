//! Error types for the sitemesh pipeline

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for the platform
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Compute backend unavailable: {0}")]
    ComputeBackendUnavailable(String),

    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    #[error("Malformed host: {0}")]
    MalformedHost(String),

    #[error("Message bus error: {0}")]
    BusError(String),

    #[error("Artifact store error: {0}")]
    StoreError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure classes, as seen by callers of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed request; reported as 4xx, never retried
    ClientInput,
    /// Compute backend, bus or store unreachable; reported as 5xx
    BackendUnavailable,
    /// A build or upload step failed inside the executor
    BuildFailure,
    /// Bus or client connection dropped while relaying
    TransportLoss,
    /// Anything else
    Internal,
}

impl PlatformError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PlatformError::InvalidRequest(_) | PlatformError::MalformedHost(_) => {
                ErrorClass::ClientInput
            }
            PlatformError::ComputeBackendUnavailable(_)
            | PlatformError::LaunchFailed(_)
            | PlatformError::StoreError(_)
            | PlatformError::HttpError(_) => ErrorClass::BackendUnavailable,
            PlatformError::BuildError(_) => ErrorClass::BuildFailure,
            PlatformError::BusError(_) => ErrorClass::TransportLoss,
            _ => ErrorClass::Internal,
        }
    }

    /// HTTP status reported to API callers.
    ///
    /// Invalid deploy payloads answer 404, which is what existing clients expect.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PlatformError::InvalidRequest(_) => StatusCode::NOT_FOUND,
            PlatformError::MalformedHost(_) => StatusCode::BAD_REQUEST,
            PlatformError::ComputeBackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlatformError::LaunchFailed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        PlatformError::Internal(err.to_string())
    }
}
