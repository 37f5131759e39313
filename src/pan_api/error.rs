use thiserror::Error;

/// Failure classes for remote API calls.
///
/// Per-item handling depends on the class: validation and not-found are
/// per-item skips, auth aborts the whole job, upstream failures carry the
/// remote errno so protocol-level fallbacks (stale receive code, unsupported
/// search filter) can key off it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected before any network call was made.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The remote object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The account credential was rejected. Never retried.
    #[error("credential rejected: {0}")]
    Auth(String),

    /// The remote returned a failure envelope.
    #[error("remote error: {message}")]
    Upstream {
        errno: Option<i64>,
        message: String,
    },

    /// HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// The remote errno, when this is an upstream failure envelope.
    pub fn errno(&self) -> Option<i64> {
        match self {
            ApiError::Upstream { errno, .. } => *errno,
            _ => None,
        }
    }
}
