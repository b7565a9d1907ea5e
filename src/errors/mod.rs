use thiserror::Error;

/// Typed error hierarchy for chatbridge.
///
/// Used at module boundaries (decision service calls, storage, config validation).
/// Internal/leaf functions keep using `anyhow::Result`; the `Internal` variant
/// converts through `?`.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decision service error [{code}]: {message}")]
    Service {
        code: String,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BridgeError {
    /// Whether the failure is transient. Informational only: nothing in the
    /// bridge retries a failed call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service {
                code, retry_after, ..
            } => retry_after.is_some() || code == "INTERNAL_ERROR" || code.starts_with("HTTP_5"),
            Self::Timeout { .. } | Self::Internal(_) => true,
            Self::Config(_) | Self::Storage(_) => false,
        }
    }
}
