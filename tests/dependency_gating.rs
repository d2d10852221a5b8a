use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use taskdag::{QosClass, QueueConfig, ShutdownMode, TaskContext, TaskQueue, TaskState};

type TestResult = Result<(), Box<dyn Error>>;

fn serial_suspended() -> taskdag::Result<TaskQueue> {
    TaskQueue::new(QueueConfig {
        workers: 1,
        max_concurrency: Some(1),
        start_suspended: true,
        ..QueueConfig::default()
    })
}

fn record(
    order: &Arc<Mutex<Vec<&'static str>>>,
    label: &'static str,
) -> impl FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'static {
    let order = Arc::clone(order);
    move |_ctx| {
        order.lock().unwrap().push(label);
        Ok(())
    }
}

#[test]
fn chain_runs_in_dependency_order() -> TestResult {
    let queue = serial_suspended()?;
    let order = Arc::new(Mutex::new(Vec::new()));

    queue.submit(QosClass::Default, &[], record(&order, "A"))?;
    let b = queue.submit(QosClass::Default, &[], record(&order, "B"))?;
    queue.submit(QosClass::Default, &[b], record(&order, "C"))?;

    queue.resume();
    queue.wait_until_all_finished();

    assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}

#[test]
fn dependent_only_starts_after_dependency_terminal() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 4,
        ..QueueConfig::default()
    })?;

    let dep_done = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicBool::new(false));

    let dep = {
        let dep_done = Arc::clone(&dep_done);
        queue.submit(QosClass::Default, &[], move |_ctx| {
            thread::sleep(Duration::from_millis(50));
            dep_done.store(true, Ordering::SeqCst);
            Ok(())
        })?
    };
    let dependent = {
        let dep_done = Arc::clone(&dep_done);
        let observed = Arc::clone(&observed);
        queue.submit(QosClass::Default, &[dep], move |_ctx| {
            observed.store(dep_done.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        })?
    };

    queue.wait_for_completion(dependent)?;
    assert!(observed.load(Ordering::SeqCst));

    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}

#[test]
fn cancelled_dependency_still_unblocks_dependent() -> TestResult {
    let queue = serial_suspended()?;
    let runs = Arc::new(AtomicUsize::new(0));

    let dep = queue.submit(QosClass::Default, &[], |_ctx| Ok(()))?;
    let dependent = {
        let runs = Arc::clone(&runs);
        queue.submit(QosClass::Default, &[dep], move |_ctx| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?
    };

    queue.cancel(dep)?;
    assert_eq!(queue.task_state(dep)?, TaskState::Cancelled);

    queue.resume();
    queue.wait_for_completion(dependent)?;

    assert_eq!(queue.task_state(dependent)?, TaskState::Finished);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}

#[test]
fn submitting_with_all_terminal_dependencies_is_ready_immediately() -> TestResult {
    let queue = TaskQueue::new(QueueConfig {
        workers: 1,
        ..QueueConfig::default()
    })?;

    let dep = queue.submit(QosClass::Default, &[], |_ctx| Ok(()))?;
    queue.wait_for_completion(dep)?;

    let late = queue.submit(QosClass::Default, &[dep], |_ctx| Ok(()))?;
    queue.wait_for_completion(late)?;
    assert_eq!(queue.task_state(late)?, TaskState::Finished);

    queue.shutdown(ShutdownMode::Drain);
    Ok(())
}
