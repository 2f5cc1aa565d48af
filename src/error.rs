/// stagecast error types and handling utilities
use thiserror::Error;

/// Main error type for notification delivery.
///
/// A sink that is intentionally inert is not an error; it reports
/// `enabled() == false` instead.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network or IO failure while talking to a backend
    #[error("Transport failure in {backend}: {reason}")]
    Transport { backend: String, reason: String },

    /// Backend answered outside the 2xx range
    #[error("{backend} responded with HTTP {status}: {body}")]
    HttpStatus {
        backend: String,
        status: u16,
        body: String,
    },

    /// Malformed input handed to an encoder
    #[error("Encoding failure: {0}")]
    Encoding(String),

    /// UDP collector hostname could not be resolved or bound
    #[error("Could not resolve {host}:{port}: {reason}")]
    Resolution {
        host: String,
        port: u16,
        reason: String,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wrapped anyhow error for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NotifyError {
    pub fn transport(backend: &str, reason: impl std::fmt::Display) -> Self {
        Self::Transport {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Whether an error is likely to clear up on its own.
///
/// Nothing in stagecast retries; this only feeds log context.
pub fn is_transient(err: &NotifyError) -> bool {
    match err {
        NotifyError::Transport { .. } => true,
        NotifyError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
        NotifyError::Resolution { .. } => true,
        NotifyError::Encoding(_) => false,
        NotifyError::Config(_) => false,
        NotifyError::Other(_) => false,
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
