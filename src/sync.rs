//! Lock primitives for the two modules a `loom`-gated build model-checks
//! ([`crate::delay_queue`] and [`crate::listener`]).
//!
//! Production builds use `parking_lot`'s infallible, non-poisoning locks directly. A `loom`-gated
//! build swaps in `loom`'s instrumented equivalents behind the same call-site shape, so
//! `RUSTFLAGS="--cfg loom" cargo test --release` exercises the exact same code paths production
//! runs, with `loom::model` exploring their possible thread interleavings instead of just running
//! them once.
//!
//! The two backends disagree on one thing: `parking_lot::Condvar::wait` mutates a `&mut
//! MutexGuard` in place, while `loom`'s (mirroring `std::sync::Condvar`) consumes and returns the
//! guard by value, because a poisonable lock's guard can't be borrowed across a potential panic
//! boundary. [`Condvar::wait`]/[`Condvar::wait_for`] here standardize on the by-value shape so
//! both backends can implement the same signature.

#[cfg(not(loom))]
mod imp {
    use std::time::Duration;

    pub(crate) use parking_lot::{Mutex, MutexGuard};

    pub(crate) struct Condvar(parking_lot::Condvar);

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(parking_lot::Condvar::new())
        }

        pub(crate) fn wait<'a, T>(&self, mut guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            self.0.wait(&mut guard);
            guard
        }

        /// Returns the guard and `true` if the wait timed out rather than being woken.
        pub(crate) fn wait_for<'a, T>(
            &self,
            mut guard: MutexGuard<'a, T>,
            timeout: Duration,
        ) -> (MutexGuard<'a, T>, bool) {
            let result = self.0.wait_for(&mut guard, timeout);
            (guard, result.timed_out())
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}

#[cfg(loom)]
mod imp {
    use std::time::Duration;

    pub(crate) use loom::sync::MutexGuard;

    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().expect("loom mutex is never poisoned under model-checking")
        }
    }

    pub(crate) struct Condvar(loom::sync::Condvar);

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(loom::sync::Condvar::new())
        }

        pub(crate) fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            self.0.wait(guard).expect("loom condvar is never poisoned under model-checking")
        }

        pub(crate) fn wait_for<'a, T>(
            &self,
            guard: MutexGuard<'a, T>,
            timeout: Duration,
        ) -> (MutexGuard<'a, T>, bool) {
            let (guard, result) = self
                .0
                .wait_timeout(guard, timeout)
                .expect("loom condvar is never poisoned under model-checking");
            (guard, result.timed_out())
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}

pub(crate) use imp::{Condvar, Mutex, MutexGuard};
