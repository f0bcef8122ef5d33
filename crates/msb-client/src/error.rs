//! Error types for the sandbox client.
//!
//! Only local call failures live here. A program that ran inside the sandbox
//! and failed is not an error: it comes back as data on
//! [`Execution`](crate::Execution) / [`CommandExecution`](crate::CommandExecution).

use thiserror::Error;

use crate::session::SessionState;

/// Errors produced by the sandbox client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The operation is not valid in the session's current lifecycle state.
    #[error("cannot {operation} sandbox while it is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The orchestrator could not be reached (DNS, connect, timeout, broken body).
    #[error("could not reach sandbox server: {0}")]
    Connectivity(#[source] reqwest::Error),

    /// The orchestrator answered with a non-2xx status.
    #[error("sandbox server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A 2xx response whose body does not fit the API contract.
    #[error("invalid response from sandbox server: {0}")]
    InvalidResponse(String),

    /// Configuration rejected before any network I/O took place.
    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    /// JSON encoding error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Connectivity(err)
    }
}

impl ClientError {
    /// `true` for invalid lifecycle transitions and rejected configuration.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidState { .. } | ClientError::InvalidConfig(_)
        )
    }

    /// `true` when repeating the same call may succeed: connectivity
    /// failures, server-side errors, throttling and request timeouts.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connectivity(_) => true,
            ClientError::Status { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            _ => false,
        }
    }

    /// HTTP status of a [`ClientError::Status`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
