//! A throughput shaper that defers submissions onto a [`PriorityScheduler`] so that total permit
//! consumption never exceeds a configured rate.
//!
//! Unlike a token-bucket limiter that blocks the caller until a permit is available, this limiter
//! never blocks `execute`/`submit`: it computes a delay and hands the task straight to the
//! scheduler with that delay, so the caller's thread is always free immediately.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::scheduler::{Priority, PriorityScheduler, ScheduledFuture};

/// Configuration for a [`RateLimiterExecutor`].
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    permits_per_second: NonZeroU32,
}

impl RateLimiterConfig {
    /// Creates a configuration that allows `permits_per_second` permits of scheduling budget
    /// every second.
    #[must_use]
    pub fn new(permits_per_second: NonZeroU32) -> Self {
        Self { permits_per_second }
    }
}

/// Paces submissions onto a [`PriorityScheduler`] so that, over time, no more than
/// `permits_per_second` permits of work are scheduled to start per second.
///
/// Holds a single monotonic `last_schedule_time`: each submission computes its own delay from the
/// current value, then advances it by the permits it consumes, so concurrent submissions
/// serialize against each other without needing a separate queue of their own.
pub struct RateLimiterExecutor {
    scheduler: Arc<PriorityScheduler>,
    clock: Clock,
    permits_per_second: NonZeroU32,
    last_schedule_time: AtomicI64,
}

impl RateLimiterExecutor {
    /// Wraps `scheduler`, pacing every task submitted through this limiter.
    #[must_use]
    pub fn new(scheduler: Arc<PriorityScheduler>, config: RateLimiterConfig) -> Self {
        let clock = scheduler.clock().clone();
        let now = clock.now_millis();
        Self {
            scheduler,
            clock,
            permits_per_second: config.permits_per_second,
            last_schedule_time: AtomicI64::new(now),
        }
    }

    fn millis_for(&self, permits: u32) -> i64 {
        i64::from(permits) * 1000 / i64::from(self.permits_per_second.get())
    }

    /// Reserves `permits` worth of scheduling budget starting from now, returning the delay (in
    /// milliseconds, relative to now) the next submission should wait.
    fn reserve(&self, permits: u32) -> i64 {
        let now = self.clock.now_millis();
        let reserved_for = self.millis_for(permits);
        let mut observed = self.last_schedule_time.load(Ordering::Acquire);
        loop {
            let delay_from_now = (observed - now).max(0);
            let next_schedule_time = now + delay_from_now + reserved_for;
            match self.last_schedule_time.compare_exchange_weak(
                observed,
                next_schedule_time,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return delay_from_now,
                Err(current) => observed = current,
            }
        }
    }

    /// Returns the delay, in milliseconds, a submission made right now would incur without
    /// reserving any budget.
    #[must_use]
    pub fn get_minimum_delay(&self) -> Duration {
        let now = self.clock.now_millis();
        let observed = self.last_schedule_time.load(Ordering::Acquire);
        let millis = (observed - now).max(0);
        #[allow(clippy::cast_sign_loss, reason = "millis was just clamped to >= 0")]
        Duration::from_millis(millis as u64)
    }

    /// Returns a future that completes once the limiter's minimum delay drops to at most
    /// `max_delay`.
    ///
    /// If the current minimum delay already satisfies `max_delay`, the returned future is already
    /// complete; otherwise schedules a no-op at `minimum_delay - max_delay` from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the underlying scheduler has been shut down.
    pub fn get_future_till_delay(&self, max_delay: Duration) -> Result<Arc<ScheduledFuture<()>>> {
        let minimum = self.get_minimum_delay();
        if minimum <= max_delay {
            return Ok(Arc::new(ScheduledFuture::already_complete(())));
        }
        let wait = minimum - max_delay;
        self.scheduler.schedule(Priority::Low, wait, || Ok(()))
    }

    /// Schedules `task` at one permit's cost, at the scheduler's default priority.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the underlying scheduler has been shut down.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> Result<Arc<ScheduledFuture<()>>> {
        self.execute_with_permits(1, task)
    }

    /// As [`RateLimiterExecutor::execute`], but consumes `permits` worth of scheduling budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `permits_per_second` overflows computing the delay, or
    /// [`Error::IllegalState`] if the underlying scheduler has been shut down.
    pub fn execute_with_permits(
        &self,
        permits: u32,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<()>>> {
        self.submit_with_permits(permits, move || {
            task();
            Ok(())
        })
    }

    /// Schedules a fallible `task` at one permit's cost, returning its result future.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the underlying scheduler has been shut down.
    pub fn submit<R: Send + Sync + 'static>(
        &self,
        task: impl FnOnce() -> std::result::Result<R, Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<R>>> {
        self.submit_with_permits(1, task)
    }

    /// As [`RateLimiterExecutor::submit`], but consumes `permits` worth of scheduling budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the underlying scheduler has been shut down.
    pub fn submit_with_permits<R: Send + Sync + 'static>(
        &self,
        permits: u32,
        task: impl FnOnce() -> std::result::Result<R, Error> + Send + 'static,
    ) -> Result<Arc<ScheduledFuture<R>>> {
        let delay_millis = self.reserve(permits);
        #[allow(clippy::cast_sign_loss, reason = "reserve() never returns a negative delay")]
        let delay = Duration::from_millis(delay_millis as u64);
        self.scheduler.schedule(Priority::Low, delay, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;
    use std::thread;

    use crate::future::ListenableFuture;
    use crate::scheduler::SchedulerConfig;

    #[test]
    fn successive_submissions_space_out_by_permit_cost() {
        let scheduler = Arc::new(PriorityScheduler::new(SchedulerConfig::new(
            NonZeroUsize::new(2).unwrap(),
        )));
        let limiter = RateLimiterExecutor::new(
            Arc::clone(&scheduler),
            RateLimiterConfig::new(NonZeroU32::new(10).unwrap()),
        );

        let observed = Arc::new(Mutex::new(Vec::new()));
        let start = limiter.clock.now_millis();
        let mut futures = Vec::new();
        for _ in 0..5 {
            let observed = Arc::clone(&observed);
            let future = limiter
                .execute(move || {
                    observed.lock().unwrap().push(());
                })
                .unwrap();
            futures.push(future);
        }
        for future in &futures {
            let _ = future.get_timeout(Duration::from_secs(2));
        }
        let elapsed = limiter.clock.now_millis() - start;
        // 5 tasks at 1 permit each, 10 permits/sec: last one is due ~400ms after the first.
        assert!(elapsed >= 350, "elapsed={elapsed}");
    }

    #[test]
    fn get_minimum_delay_grows_with_reservations() {
        let scheduler = Arc::new(PriorityScheduler::new(SchedulerConfig::new(
            NonZeroUsize::new(1).unwrap(),
        )));
        let limiter = RateLimiterExecutor::new(scheduler, RateLimiterConfig::new(NonZeroU32::new(10).unwrap()));
        assert_eq!(limiter.get_minimum_delay(), Duration::ZERO);
        limiter.reserve(5);
        let delay = limiter.get_minimum_delay();
        assert!(delay >= Duration::from_millis(400), "delay={delay:?}");
    }

    #[test]
    fn future_till_delay_completes_immediately_when_already_satisfied() {
        let scheduler = Arc::new(PriorityScheduler::new(SchedulerConfig::new(
            NonZeroUsize::new(1).unwrap(),
        )));
        let limiter = RateLimiterExecutor::new(scheduler, RateLimiterConfig::new(NonZeroU32::new(10).unwrap()));
        let future = limiter.get_future_till_delay(Duration::from_secs(1)).unwrap();
        assert!(future.is_done());
    }

    #[test]
    fn future_till_delay_waits_when_minimum_exceeds_max() {
        let scheduler = Arc::new(PriorityScheduler::new(SchedulerConfig::new(
            NonZeroUsize::new(1).unwrap(),
        )));
        let limiter = RateLimiterExecutor::new(Arc::clone(&scheduler), RateLimiterConfig::new(NonZeroU32::new(2).unwrap()));
        limiter.reserve(10); // reserve 5s of budget
        let future = limiter.get_future_till_delay(Duration::from_millis(100)).unwrap();
        assert!(!future.is_done());
        thread::sleep(Duration::from_millis(50));
        assert!(!future.is_done(), "should not complete before its scheduled delay");
    }
}
