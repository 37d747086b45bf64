use thiserror::Error;

/// Protocol-level failures of one master/worker session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("socket connection broken")]
    ConnectionBroken,
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("unexpected message: {0}")]
    Unexpected(String),
    #[error("declared capacity must be at least 1")]
    InvalidCapacity,
    #[error("refusing unsafe path {0:?}")]
    UnsafePath(String),
    #[error("no function registered as {0}")]
    UnknownFunction(String),
    #[error("function returned {returned} results for {expected} arguments")]
    ResultCountMismatch { expected: usize, returned: usize },
}

impl SessionError {
    /// True if `err` is (or wraps) a [`SessionError::Timeout`].
    pub fn is_timeout(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<SessionError>(), Some(SessionError::Timeout))
    }
}
