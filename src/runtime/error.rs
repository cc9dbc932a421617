//! Runtime errors

use std::time::Duration;
use thiserror::Error;

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the concurrency core.
///
/// Errors are `Clone` because a single failed message is observed by every
/// caller of `Future::get` and every `on_complete` callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error("ActorPool '{0}' is stopped")]
    PoolStopped(String),

    #[error("Not immutable: {0}")]
    NotImmutable(String),

    #[error("Invalid argument: {0}")]
    Arg(String),

    #[error("Read-only: {0}")]
    ReadOnly(String),

    #[error("Future.get timed out after {0:?}")]
    Timeout(Duration),

    #[error("Message cancelled")]
    Cancelled,

    /// Error raised by a message handler or callable body.
    #[error("{0}")]
    Raised(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl RuntimeError {
    /// Build a handler error from any displayable message.
    pub fn raised(msg: impl Into<String>) -> Self {
        RuntimeError::Raised(msg.into())
    }

    /// Name of the error kind as seen by runtime programs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "ConfigErr",
            RuntimeError::PoolStopped(_) => "PoolStoppedErr",
            RuntimeError::NotImmutable(_) => "NotImmutableErr",
            RuntimeError::Arg(_) => "ArgErr",
            RuntimeError::ReadOnly(_) => "ReadonlyErr",
            RuntimeError::Timeout(_) => "TimeoutErr",
            RuntimeError::Cancelled => "CancelledErr",
            RuntimeError::Raised(_) => "Err",
            RuntimeError::Panicked(_) => "Err",
        }
    }

    /// Check if this error was produced by handler code rather than the runtime.
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, RuntimeError::Raised(_) | RuntimeError::Panicked(_))
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
