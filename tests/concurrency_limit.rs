use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use taskdag::{QosClass, QueueConfig, QueueError, ShutdownMode, TaskQueue};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn executing_never_exceeds_limit() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 4,
        max_concurrency: Some(2),
        ..QueueConfig::default()
    })?;

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    // The first two tasks rendezvous to prove two slots really run at once.
    let pair = Arc::new(Barrier::new(2));

    for i in 0..8 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let pair = Arc::clone(&pair);
        queue.submit(QosClass::Default, &[], move |_ctx| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            if i < 2 {
                pair.wait();
            }
            thread::sleep(Duration::from_millis(20));
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })?;
    }

    queue.wait_until_all_finished();

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}

#[test]
fn raising_the_limit_applies_to_future_claims() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 4,
        max_concurrency: Some(1),
        start_suspended: true,
        ..QueueConfig::default()
    })?;

    for _ in 0..4 {
        queue.submit(QosClass::Default, &[], |_ctx| {
            thread::sleep(Duration::from_millis(10));
            Ok(())
        })?;
    }

    queue.set_max_concurrency(4)?;
    assert_eq!(queue.max_concurrency(), 4);

    queue.resume();
    queue.wait_until_all_finished();
    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}

#[test]
fn zero_limit_is_rejected() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 1,
        ..QueueConfig::default()
    })?;

    assert!(matches!(
        queue.set_max_concurrency(0),
        Err(QueueError::Config(_))
    ));

    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}
