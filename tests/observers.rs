use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use taskdag::{
    QosClass, QueueConfig, ShutdownMode, TaskEvent, TaskOutcome, TaskQueue, TaskState,
};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn observer_registered_before_completion_fires_exactly_once() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 1,
        start_suspended: true,
        ..QueueConfig::default()
    })?;
    let fired = Arc::new(AtomicUsize::new(0));

    let task = queue.submit(QosClass::Default, &[], |_ctx| Ok(()))?;
    {
        let fired = Arc::clone(&fired);
        queue.add_completion_observer(task, move |event| {
            assert!(matches!(
                event,
                TaskEvent::Completed {
                    outcome: TaskOutcome::Finished
                }
            ));
            fired.fetch_add(1, Ordering::SeqCst);
        })?;
    }

    queue.resume();
    queue.wait_for_completion(task)?;
    queue.shutdown(ShutdownMode::Drain);

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn observer_registered_after_completion_fires_synchronously() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 1,
        ..QueueConfig::default()
    })?;
    let fired = Arc::new(AtomicUsize::new(0));

    let task = queue.submit(QosClass::Default, &[], |_ctx| Ok(()))?;
    queue.wait_for_completion(task)?;

    {
        let fired = Arc::clone(&fired);
        queue.add_completion_observer(task, move |_event| {
            fired.fetch_add(1, Ordering::SeqCst);
        })?;
    }

    // Fired on the registering thread, before add_completion_observer
    // returned.
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    queue.shutdown(ShutdownMode::Drain);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn observer_fires_once_on_cancellation() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 1,
        start_suspended: true,
        ..QueueConfig::default()
    })?;
    let fired = Arc::new(AtomicUsize::new(0));

    let task = queue.submit(QosClass::Default, &[], |_ctx| Ok(()))?;
    {
        let fired = Arc::clone(&fired);
        queue.add_completion_observer(task, move |event| {
            assert!(matches!(
                event,
                TaskEvent::Completed {
                    outcome: TaskOutcome::Cancelled
                }
            ));
            fired.fetch_add(1, Ordering::SeqCst);
        })?;
    }

    queue.cancel(task)?;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    queue.shutdown(ShutdownMode::Drain);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn state_observer_sees_the_full_transition_sequence() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 1,
        start_suspended: true,
        ..QueueConfig::default()
    })?;
    let events = Arc::new(Mutex::new(Vec::new()));

    let task = queue.submit(QosClass::Default, &[], |_ctx| Ok(()))?;
    {
        let events = Arc::clone(&events);
        queue.add_state_observer(task, move |event| {
            events.lock().unwrap().push(event);
        })?;
    }

    queue.resume();
    queue.wait_for_completion(task)?;
    queue.shutdown(ShutdownMode::Drain);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(
        events[0],
        TaskEvent::StateChanged {
            from: TaskState::Ready,
            to: TaskState::Executing
        }
    ));
    assert!(matches!(
        events[1],
        TaskEvent::StateChanged {
            from: TaskState::Executing,
            to: TaskState::Finished
        }
    ));
    assert!(matches!(
        events[2],
        TaskEvent::Completed {
            outcome: TaskOutcome::Finished
        }
    ));
    Ok(())
}
