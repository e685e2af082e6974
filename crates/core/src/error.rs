//! Unified error types for cachefirst.
//!
//! Every variant renders with a stable machine code prefix so the host
//! protocol and logs can match on it without parsing free text.

use tokio_rusqlite::rusqlite;

/// Unified error types for the cachefirst worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input (e.g., malformed header value).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unresolvable URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Only GET requests can be matched or stored.
    #[error("UNSUPPORTED_METHOD: {0}")]
    UnsupportedMethod(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Transport-level failure (unreachable host, reset connection, ...).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// A precache URL could not be fetched during install.
    #[error("PRECACHE_FAILED: {url}: {reason}")]
    PrecacheFailed { url: String, reason: String },

    /// Lifecycle event received in the wrong state.
    #[error("INVALID_STATE: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Body could not be normalized into a payload.
    #[error("NORMALIZE_FAILED: {0}")]
    Normalize(String),

    /// Message could not be delivered to a client.
    #[error("DELIVERY_FAILED: {0}")]
    Delivery(String),
}

impl Error {
    /// Stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptEntry(_) => "CACHE_ERROR",
            Error::UnsupportedMethod(_) => "UNSUPPORTED_METHOD",
            Error::FetchTimeout(_) => "FETCH_TIMEOUT",
            Error::FetchTooLarge(_) => "FETCH_TOO_LARGE",
            Error::Network(_) => "NETWORK_ERROR",
            Error::PrecacheFailed { .. } => "PRECACHE_FAILED",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::Normalize(_) => "NORMALIZE_FAILED",
            Error::Delivery(_) => "DELIVERY_FAILED",
        }
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
