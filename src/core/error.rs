use std::path::PathBuf;
use std::time::Duration;

/// Why a backend refused, or never received, a job submission.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("cannot connect to server")]
    CannotConnect,

    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("server returned {status}: {reason}")]
    Status { status: u16, reason: String },

    /// The backend answered with its own `error` text.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("http error: {0}")]
    Http(String),
}

/// A failed read of the backend's progress (or health) endpoint.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("cannot connect to server")]
    CannotConnect,

    #[error("timeout after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReorganizeError {
    #[error("a file reorganization is already running")]
    Busy,

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("job was already started")]
    AlreadyStarted,

    #[error(transparent)]
    Submission(#[from] SubmitError),

    #[error(transparent)]
    Reorganize(#[from] ReorganizeError),
}

impl SubmitError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            SubmitError::Timeout(timeout)
        } else if err.is_connect() {
            SubmitError::CannotConnect
        } else {
            SubmitError::Http(err.to_string())
        }
    }
}

impl TransportError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() {
            TransportError::CannotConnect
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
