//! Semaphore cap: three operations contend on a counting semaphore with
//! `max_allowed = 2`; the observed concurrency must never exceed that cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use coyote::{ErrorCode, Scheduler, Settings};

const SEMAPHORE_ID: u64 = 1;
const THREAD_COUNT: u64 = 3;
const MAX_ALLOWED: usize = 2;

#[test]
fn semaphore_cap_never_exceeded_across_100_iterations() {
    for iteration in 0..100u64 {
        let mut settings = Settings::new();
        settings.use_random_strategy_with_probability(7, 100);
        let scheduler = Arc::new(Scheduler::new(settings));
        let current = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        assert_eq!(scheduler.attach(), ErrorCode::Success);
        assert_eq!(scheduler.create_resource(SEMAPHORE_ID), ErrorCode::Success);
        for id in 1..=THREAD_COUNT {
            assert_eq!(scheduler.create_operation(id), ErrorCode::Success);
        }

        let handles: Vec<_> = (1..=THREAD_COUNT)
            .map(|id| {
                let scheduler = scheduler.clone();
                let current = current.clone();
                let max_observed = max_observed.clone();
                thread::spawn(move || {
                    scheduler.start_operation(id);
                    loop {
                        scheduler.schedule_next_operation();
                        let before = current.fetch_add(1, Ordering::SeqCst);
                        if before < MAX_ALLOWED {
                            break;
                        }
                        current.fetch_sub(1, Ordering::SeqCst);
                        scheduler.wait_resource(SEMAPHORE_ID);
                    }
                    max_observed.fetch_max(current.load(Ordering::SeqCst), Ordering::SeqCst);
                    scheduler.schedule_next_operation();
                    current.fetch_sub(1, Ordering::SeqCst);
                    scheduler.signal_resource(SEMAPHORE_ID);
                    scheduler.complete_operation(id);
                })
            })
            .collect();

        assert_eq!(
            scheduler.detach(),
            ErrorCode::Success,
            "iteration {iteration} did not complete cleanly"
        );
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(
            max_observed.load(Ordering::SeqCst) <= MAX_ALLOWED,
            "iteration {iteration} observed more than {MAX_ALLOWED} concurrent holders"
        );
    }
}
