use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use pendulum::{ListenableFuture, Priority, PriorityScheduler, SchedulerConfig};

fn submit_1k_one_shot_tasks(c: &mut Criterion) {
    let scheduler = PriorityScheduler::new(SchedulerConfig::new(NonZeroUsize::new(4).unwrap()));

    c.bench_function("submit_1k_one_shot_tasks", |b| {
        b.iter(|| {
            let completed = Arc::new(AtomicUsize::new(0));
            let mut futures = Vec::with_capacity(1_000);
            for _ in 0..1_000 {
                let completed = Arc::clone(&completed);
                let future = scheduler
                    .submit(Priority::Low, move || {
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
                futures.push(future);
            }
            for future in &futures {
                let _ = future.get_timeout(Duration::from_secs(5));
            }
        });
    });
}

fn mixed_priority_submission(c: &mut Criterion) {
    let scheduler = PriorityScheduler::new(SchedulerConfig::new(NonZeroUsize::new(4).unwrap()));

    c.bench_function("submit_500_high_500_low", |b| {
        b.iter(|| {
            let mut futures = Vec::with_capacity(1_000);
            for i in 0..1_000 {
                let priority = if i % 2 == 0 { Priority::High } else { Priority::Low };
                futures.push(scheduler.submit(priority, || Ok(())).unwrap());
            }
            for future in &futures {
                let _ = future.get_timeout(Duration::from_secs(5));
            }
        });
    });
}

criterion_group!(benches, submit_1k_one_shot_tasks, mixed_priority_submission);
criterion_main!(benches);
