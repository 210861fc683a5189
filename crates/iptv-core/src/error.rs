use thiserror::Error;

/// Failures reported by a native player backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported media: {0}")]
    Unsupported(String),
    #[error("resource unreachable: {0}")]
    Unreachable(String),
    #[error("player ipc failed: {0}")]
    Ipc(String),
    /// Non-recoverable.  The session manager stops when it sees one.
    #[error("fatal player failure: {0}")]
    Fatal(String),
}

/// Errors returned to callers of the session manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid locator '{0}': expected an http:// or https:// url")]
    InvalidLocator(String),
    #[error("no channel at index {0}")]
    UnknownChannel(usize),
    #[error("player construction failed: {0}")]
    ConstructionFailure(String),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error("session manager is not running")]
    Closed,
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Fatal(msg) => SessionError::Fatal(msg),
            other => SessionError::ConstructionFailure(other.to_string()),
        }
    }
}
