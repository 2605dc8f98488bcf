//! Error types reported by host capabilities

use thiserror::Error;

/// Errors raised while fetching, evaluating or calling into host code
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Fetch failed for {locator}: status {status}")]
    Fetch { locator: String, status: u16 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("Not callable: {0}")]
    NotCallable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl HostError {
    /// Status code carried by a failed fetch, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            HostError::Fetch { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error came from the fetch side rather than evaluation
    pub fn is_fetch(&self) -> bool {
        matches!(self, HostError::Fetch { .. } | HostError::Io(_) | HostError::Http(_))
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError::Io(err.to_string())
    }
}
