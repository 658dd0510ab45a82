//! Terminal-state representation shared by every future flavor in this crate.

use std::sync::Arc;

use crate::error::Error;

/// The lifecycle of a [`crate::future::ListenableFuture`].
///
/// `Succeeded`/`Failed`/`Cancelled` are absorbing: once reached, a future never transitions again.
/// Results and failures are held behind an `Arc` so `get()` can be called more than once (and from
/// more than one thread) without requiring the payload to implement `Clone`.
#[derive(Debug)]
pub enum FutureState<T> {
    /// Not yet complete.
    Pending,
    /// Completed successfully with the wrapped value.
    Succeeded(Arc<T>),
    /// Completed with a failure.
    Failed(Arc<Error>),
    /// Cancelled before it ever completed.
    Cancelled,
}

impl<T> FutureState<T> {
    /// Returns `true` for any of the three terminal variants.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FutureState::Pending)
    }

    /// Returns `true` for `Cancelled`.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FutureState::Cancelled)
    }
}

impl<T> Clone for FutureState<T> {
    fn clone(&self) -> Self {
        match self {
            FutureState::Pending => FutureState::Pending,
            FutureState::Succeeded(v) => FutureState::Succeeded(Arc::clone(v)),
            FutureState::Failed(e) => FutureState::Failed(Arc::clone(e)),
            FutureState::Cancelled => FutureState::Cancelled,
        }
    }
}
