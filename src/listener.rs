//! Single-producer-of-completion, many-listener dispatch primitive.
//!
//! Used by [`crate::future`] to fan a single completion event out to every listener and typed
//! callback registered on a future, and available standalone for callers that want the same
//! "fire once, or fire on every call" semantics without a future attached.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sync::Mutex;

/// A listener action: a no-argument callback invoked when the event fires.
pub type Listener = dyn Fn() + Send + Sync;

/// Runs a boxed unit of work, typically a thread pool or the priority scheduler itself.
///
/// A listener registered with `Some(executor)` runs on that executor instead of inline on the
/// thread that triggers it.
pub trait Executor: Send + Sync {
    /// Submits `task` for execution. Implementations should not block the calling thread waiting
    /// for `task` to finish.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

struct Registration {
    listener: Arc<Listener>,
    executor: Option<Arc<dyn Executor>>,
}

struct Inner {
    registrations: Vec<Registration>,
    /// Only meaningful in one-shot mode: `true` once `call_listeners` has run.
    called: bool,
}

/// Fan-out helper with two modes, chosen at construction via [`ListenerHelper::construct`]:
///
/// * **One-shot** (`call_once = true`): `call_listeners` may run exactly once. Listeners added
///   after that run are invoked immediately instead of being queued.
/// * **Repeated** (`call_once = false`): `call_listeners` may run any number of times, dispatching
///   every currently-registered listener each time. A listener added by another listener during a
///   run is not invoked during that same run.
pub struct ListenerHelper {
    call_once: bool,
    inner: Mutex<Inner>,
}

impl ListenerHelper {
    /// Creates a helper in one-shot or repeated mode.
    #[must_use]
    pub fn construct(call_once: bool) -> Self {
        Self { call_once, inner: Mutex::new(Inner { registrations: Vec::new(), called: false }) }
    }

    /// Registers `listener`, to run on `executor` if given or inline otherwise.
    ///
    /// In one-shot mode, if `call_listeners` has already run, `listener` is invoked synchronously
    /// by this call (on `executor` if given, otherwise on the caller's thread) instead of being
    /// queued. A panic from a same-thread invocation in that path propagates out of this call, the
    /// way a directly-invoked closure would.
    pub fn add_listener(&self, listener: Arc<Listener>, executor: Option<Arc<dyn Executor>>) {
        let already_fired = {
            let mut inner = self.inner.lock();
            if self.call_once && inner.called {
                true
            } else {
                inner.registrations.push(Registration { listener: Arc::clone(&listener), executor: executor.clone() });
                false
            }
        };
        if already_fired {
            dispatch_uncaught(&listener, executor.as_deref());
        }
    }

    /// Removes `listener` if present, returning whether it was found. Identity is by `Arc`
    /// pointer, so the caller must retain and pass the same `Arc` used to register it.
    pub fn remove_listener(&self, listener: &Arc<Listener>) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.registrations.len();
        inner.registrations.retain(|r| !Arc::ptr_eq(&r.listener, listener));
        inner.registrations.len() != before
    }

    /// Removes every registered listener.
    pub fn clear_listeners(&self) {
        self.inner.lock().registrations.clear();
    }

    /// Returns the number of currently-registered listeners.
    #[must_use]
    pub fn registered_listener_count(&self) -> usize {
        self.inner.lock().registrations.len()
    }

    /// Dispatches every currently-registered listener.
    ///
    /// Panics inside a listener invoked inline are caught and logged rather than propagated, per
    /// this helper's "deliver to the process-wide uncaught-exception handler" contract; this
    /// crate has no such handler to install into, so a `tracing::error!` stands in for it.
    ///
    /// # Errors
    ///
    /// In one-shot mode, returns [`Error::IllegalState`] if this is the second call.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn call_listeners(&self) -> Result<()> {
        let batch = {
            let mut inner = self.inner.lock();
            if self.call_once {
                if inner.called {
                    return Err(Error::illegal_state(
                        "call_listeners() already invoked on a one-shot listener helper",
                    ));
                }
                inner.called = true;
                std::mem::take(&mut inner.registrations)
            } else {
                inner.registrations.iter().map(Registration::snapshot).collect::<Vec<_>>()
            }
        };
        for reg in &batch {
            dispatch_caught(&reg.listener, reg.executor.as_deref());
        }
        Ok(())
    }
}

impl Registration {
    fn snapshot(&self) -> Self {
        Self { listener: Arc::clone(&self.listener), executor: self.executor.clone() }
    }
}

fn dispatch_caught(listener: &Arc<Listener>, executor: Option<&dyn Executor>) {
    match executor {
        Some(executor) => {
            let listener = Arc::clone(listener);
            executor.execute(Box::new(move || {
                if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                    tracing::error!("listener panicked while running on an executor");
                }
            }));
        }
        None => {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                tracing::error!("listener panicked during inline dispatch");
            }
        }
    }
}

fn dispatch_uncaught(listener: &Arc<Listener>, executor: Option<&dyn Executor>) {
    match executor {
        Some(executor) => {
            let listener = Arc::clone(listener);
            executor.execute(Box::new(move || listener()));
        }
        None => listener(),
    }
}


/// Model-checks the one-shot count invariant: `call_listeners` on a `call_once` helper may
/// succeed for exactly one of any number of racing callers, under concurrent interleavings
/// rather than just running it once.
#[cfg(loom)]
mod loom_tests {
    use super::*;

    #[test]
    fn exactly_one_of_two_concurrent_call_listeners_succeeds() {
        loom::model(|| {
            let helper = Arc::new(ListenerHelper::construct(true));
            let fired = Arc::new(crate::sync::Mutex::new(0u32));

            {
                let fired = Arc::clone(&fired);
                helper.add_listener(Arc::new(move || { *fired.lock() += 1; }), None);
            }

            let threads: Vec<_> = (0..2)
                .map(|_| {
                    let helper = Arc::clone(&helper);
                    loom::thread::spawn(move || helper.call_listeners().is_ok())
                })
                .collect();

            let outcomes: Vec<bool> = threads.into_iter().map(|t| t.join().unwrap()).collect();
            assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
            assert_eq!(*fired.lock(), 1);
        });
    }

    #[test]
    fn listener_added_after_call_listeners_fires_exactly_once() {
        loom::model(|| {
            let helper = Arc::new(ListenerHelper::construct(true));
            let late_fired = Arc::new(crate::sync::Mutex::new(0u32));

            let caller = {
                let helper = Arc::clone(&helper);
                loom::thread::spawn(move || { let _ = helper.call_listeners(); })
            };

            let registrar = {
                let helper = Arc::clone(&helper);
                let late_fired = Arc::clone(&late_fired);
                loom::thread::spawn(move || {
                    helper.add_listener(Arc::new(move || { *late_fired.lock() += 1; }), None);
                })
            };

            caller.join().unwrap();
            registrar.join().unwrap();
            assert_eq!(*late_fired.lock(), 1);
        });
    }
}
