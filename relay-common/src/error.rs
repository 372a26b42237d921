//! Error types for the relay session layer.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for relay crates.
///
/// Nothing in the session core treats any of these as fatal: dedup
/// failures degrade to "unseen", handler errors fall through to the
/// default inference path, and inference failures yield no reply.
#[derive(Error, Debug)]
pub enum Error {
    /// No pooled connection became available within the acquire timeout.
    #[error("Connection pool exhausted (acquire timed out)")]
    PoolExhausted,

    /// Underlying SQLite failure.
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// An extension definition failed to parse or construct.
    #[error("Extension load error: {0}")]
    ExtensionLoad(String),

    /// An extension's handle call failed or panicked.
    #[error("Extension handler error: {0}")]
    ExtensionHandler(String),

    /// The external inference service failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// The external inference call exceeded its timeout.
    #[error("Inference call timed out")]
    InferenceTimeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error means the pool acquire timed out.
    pub const fn is_pool_exhausted(&self) -> bool {
        matches!(self, Self::PoolExhausted)
    }

    /// Check if this is an inference timeout.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::InferenceTimeout)
    }

    /// Errors the request path absorbs rather than surfaces: the
    /// pipeline keeps running and the failure is only logged.
    pub const fn is_absorbed(&self) -> bool {
        matches!(
            self,
            Self::ExtensionHandler(_) | Self::Inference(_) | Self::InferenceTimeout
        )
    }
}
