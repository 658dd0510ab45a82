//! Monotonic time source used throughout the crate.
//!
//! Every deadline elsewhere in this crate is expressed as signed "milliseconds from now"; this
//! module is the single place that turns `std::time::Instant` into that representation. A
//! `no_std`, hardware-agnostic executor typically needs a vtable-indirected clock because it
//! cannot assume a timer peripheral exists; a hosted `std` crate already has one canonical
//! monotonic source (`Instant::now`), so the indirection collapses to a thin wrapper plus a
//! cached last-known value for hot paths that can tolerate a slightly stale reading.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic clock reporting milliseconds elapsed since an arbitrary epoch.
///
/// Cloning a `Clock` shares the same epoch, so clones compare consistently.
#[derive(Debug, Clone)]
pub struct Clock {
    epoch: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Creates a new clock anchored to the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    /// Returns the number of milliseconds elapsed since this clock's epoch.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "elapsed wall-clock milliseconds since process start fit in i64 for any realistic uptime"
    )]
    pub fn now_millis(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    /// Returns the underlying `Instant` this clock is anchored to.
    #[must_use]
    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Converts a millisecond timestamp produced by [`Clock::now_millis`] back into an `Instant`.
    #[must_use]
    pub fn instant_at(&self, millis: i64) -> Instant {
        if millis >= 0 {
            self.epoch + Duration::from_millis(millis.unsigned_abs())
        } else {
            self.epoch - Duration::from_millis(millis.unsigned_abs())
        }
    }

    /// Returns a [`CachedClock`] sharing this clock's epoch.
    #[must_use]
    pub fn cached(&self) -> CachedClock {
        CachedClock {
            clock: self.clone(),
            last_known: AtomicI64::new(self.now_millis()),
        }
    }
}

/// A [`Clock`] with a cached "last-known" value for callers on a hot path that can tolerate a
/// slightly stale reading (the delay queue's lock-free `peek` double-check is the intended use).
///
/// `refresh` performs the real syscall-backed read and updates the cache; `last_known` is free of
/// any synchronization beyond a single atomic load.
#[derive(Debug)]
pub struct CachedClock {
    clock: Clock,
    last_known: AtomicI64,
}

impl CachedClock {
    /// Reads the real clock, updates the cache, and returns the fresh value.
    pub fn refresh(&self) -> i64 {
        let now = self.clock.now_millis();
        self.last_known.store(now, Ordering::Relaxed);
        now
    }

    /// Returns the most recently cached value without touching the underlying clock.
    #[must_use]
    pub fn last_known(&self) -> i64 {
        self.last_known.load(Ordering::Relaxed)
    }

    /// Returns the clock backing this cache.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn now_millis_is_monotonic_nondecreasing() {
        let clock = Clock::new();
        let a = clock.now_millis();
        thread::sleep(Duration::from_millis(5));
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn clones_share_epoch() {
        let clock = Clock::new();
        let cloned = clock.clone();
        thread::sleep(Duration::from_millis(2));
        assert!((clock.now_millis() - cloned.now_millis()).abs() < 5);
    }

    #[test]
    fn cached_clock_requires_explicit_refresh() {
        let clock = Clock::new();
        let cached = clock.cached();
        let initial = cached.last_known();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(cached.last_known(), initial);
        let refreshed = cached.refresh();
        assert!(refreshed >= initial);
        assert_eq!(cached.last_known(), refreshed);
    }
}
