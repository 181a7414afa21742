//! Error taxonomy for the messaging core.
//!
//! Each component owns one error enum; the pipeline folds them into a
//! single classified [`SendError`]. Transience rules live here so retry
//! policy stays in one place: admission rate limits carry their own wait
//! hint, transport failures are always retryable, backend failures are
//! retryable only for rate-limit and server-side subtypes.

use std::time::Duration;

use thiserror::Error;

/// Errors from admission control.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The per-window limit was hit. Retrying after `retry_after` can
    /// succeed; the value is derived from the oldest request still inside
    /// the window.
    #[error("rate limit exceeded, retry in {retry_after:?}")]
    RateExceeded { retry_after: Duration },

    /// The tier's lifetime cap was hit. Terminal: no amount of waiting
    /// resolves it, the caller must upgrade or authenticate.
    #[error("lifetime message cap exhausted")]
    LifetimeExceeded,
}

/// Errors from outbound message validation. Always terminal.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    Empty,

    #[error("message is {len} characters, maximum is {max}")]
    TooLong { len: usize, max: usize },
}

/// Connection-level failures. Always transient.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("stream interrupted: {0}")]
    Interrupted(String),
}

/// Structured failures reported by the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("backend server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("backend rejected request: {0}")]
    InvalidRequest(String),

    #[error("backend authentication failed")]
    AuthFailed,
}

impl BackendError {
    /// Whether a retry without caller intervention can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimited { .. } | BackendError::Server { .. }
        )
    }
}

/// A single dispatch attempt's failure: either the wire or the backend.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl DispatchError {
    /// Whether the retry policy should try again.
    pub fn is_transient(&self) -> bool {
        match self {
            DispatchError::Transport(_) => true,
            DispatchError::Backend(err) => err.is_transient(),
        }
    }
}

/// Errors from persistence operations. Propagated directly: durability is
/// a load-bearing guarantee and must not be silently masked.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// The single classified error surface of `ConversationPipeline::send`.
///
/// Raw transport errors never reach the caller mid-retry; only the final
/// classified failure does, after the retry budget is spent.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<DispatchError> for SendError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Transport(e) => SendError::Transport(e),
            DispatchError::Backend(e) => SendError::Backend(e),
        }
    }
}
