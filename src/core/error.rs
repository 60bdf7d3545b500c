use thiserror::Error;

/// Result alias used across the engine.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors reported synchronously by engine operations.
///
/// Nothing is retried or swallowed internally; every failure surfaces to the
/// caller of the offending operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A required argument was missing, empty, or foreign to this engine.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not legal in the current state of its target.
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl QueueError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        QueueError::InvalidArgument(msg.into())
    }

    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        QueueError::IllegalState(msg.into())
    }
}

/// Rejects empty queue names.
pub(crate) fn require_queue_name(name: &str) -> QueueResult<()> {
    if name.is_empty() {
        return Err(QueueError::invalid("queue name must not be empty"));
    }
    Ok(())
}
