//! Errors raised by the stdio host.
//!
//! Worker errors keep their own machine codes; the host only adds malformed
//! protocol input and I/O on its own streams.

use cachefirst_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A protocol line that could not be understood.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// An event the worker rejected.
    #[error(transparent)]
    Worker(#[from] Error),

    /// Reading stdin or writing stdout failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn code(&self) -> &'static str {
        match self {
            HostError::InvalidInput(_) => "INVALID_INPUT",
            HostError::Worker(err) => err.code(),
            HostError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::InvalidInput(err.to_string())
    }
}
