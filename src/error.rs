//! Error types shared across the crate.
//!
//! Every fallible public entry point in `pendulum` returns [`Result<T, Error>`]. One enum covers
//! every module's boundary error kinds rather than inventing a separate type per module.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the boundary of `pendulum`'s public API.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller passed a null, negative, or otherwise out-of-range argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted in a state that forbids it (submission after shutdown,
    /// double-completion of a settable future, a second `callListeners` on a one-shot helper).
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The future was cancelled before it completed.
    #[error("future was cancelled")]
    Cancelled,

    /// A blocking call did not reach a terminal state within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A worker was interrupted while parked, typically as part of `shutdown_now`.
    #[error("operation was interrupted")]
    Interrupted,

    /// A task's body returned an error or panicked; `cause` carries the captured failure.
    #[error("task execution failed: {cause}")]
    ExecutionFailure {
        /// Human-readable description of the underlying failure.
        cause: String,
    },

    /// A consuming iterator observed the delay queue's head change between `peek` and `remove`.
    #[error("concurrent modification of delay queue detected")]
    ConcurrentModification,
}

impl Error {
    /// Builds an [`Error::InvalidArgument`] from any displayable message.
    pub fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    /// Builds an [`Error::IllegalState`] from any displayable message.
    pub fn illegal_state(msg: impl fmt::Display) -> Self {
        Error::IllegalState(msg.to_string())
    }

    /// Builds an [`Error::ExecutionFailure`] from a captured panic payload.
    ///
    /// The payload is downcast to `&str`/`String` on a best-effort basis, falling back to a
    /// generic description when the panic carried an opaque value.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let cause = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };
        Error::ExecutionFailure { cause }
    }

    /// Returns `true` if this error represents cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns `true` if this error represents a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
