//! Core error type for SCG.
//!
//! Every failure is logged where it happens and then propagated unchanged;
//! nothing in the core retries.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScgError {
    /// The assistant server could not be reached or the transport died.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server reported an in-session failure (`session.error`), or
    /// the session is in a state that does not allow the operation.
    #[error("Session error: {0}")]
    Session(String),

    #[error("Timeout after {}s waiting for {operation}", after.as_secs_f64())]
    Timeout { operation: String, after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed frame, response or event payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScgError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScgError>;
