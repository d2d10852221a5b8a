// src/lib.rs

//! A dependency-aware task queue on a bounded pool of worker threads.
//!
//! Tasks are closures submitted with a QoS class and an optional set of
//! prerequisite tasks. The queue tracks prerequisites in a dependency graph
//! (cycles are rejected at registration), orders eligible tasks by priority
//! with stable FIFO within a class, and executes them on a fixed set of
//! worker threads under a configurable concurrency limit. Cancellation is
//! immediate for work that has not started and cooperative for running
//! payloads; completion can be observed through callbacks or blocking waits.
//!
//! ```
//! use taskdag::{QosClass, ShutdownMode, TaskQueue};
//!
//! # fn main() -> taskdag::Result<()> {
//! let queue = TaskQueue::with_defaults()?;
//!
//! let first = queue.submit(QosClass::Default, &[], |_ctx| {
//!     // do some work
//!     Ok(())
//! })?;
//! let second = queue.submit(QosClass::Default, &[first], |_ctx| {
//!     // runs only after `first` reached a terminal state
//!     Ok(())
//! })?;
//!
//! queue.wait_for_completion(second)?;
//! queue.shutdown(ShutdownMode::Drain);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub use crate::config::QueueConfig;
pub use crate::engine::ShutdownMode;
pub use crate::errors::{QueueError, Result};
pub use crate::task::{
    QosClass, TaskContext, TaskEvent, TaskId, TaskOutcome, TaskState,
};

use crate::engine::QueueCore;

/// Handle to a running task queue.
///
/// Cheap to clone; clones share the same engine and worker pool, so a
/// payload can capture a clone and submit or cancel further work. The pool
/// keeps running until [`shutdown`](TaskQueue::shutdown) is called
/// explicitly (dropping all handles does not stop the workers).
#[derive(Clone)]
pub struct TaskQueue {
    core: Arc<QueueCore>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskQueue {
    /// Build a queue and spawn its worker threads.
    pub fn new(config: QueueConfig) -> Result<Self> {
        config::validate_config(&config)?;
        let core = Arc::new(QueueCore::new(&config));
        let handles = exec::spawn_workers(&core, config.workers)?;
        Ok(Self {
            core,
            workers: Arc::new(Mutex::new(handles)),
        })
    }

    /// Build a queue from [`QueueConfig::default`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(QueueConfig::default())
    }

    /// Submit a task. It becomes ready as soon as every task in
    /// `dependencies` has reached a terminal state (immediately, if the set
    /// is empty), and is then claimed in QoS-then-submission order.
    ///
    /// The payload receives a [`TaskContext`]; long-running payloads should
    /// poll [`TaskContext::is_cancelled`] at safe points. A payload error is
    /// recorded as the task's failure reason and does not affect dependents
    /// by default.
    pub fn submit<F>(&self, qos: QosClass, dependencies: &[TaskId], payload: F) -> Result<TaskId>
    where
        F: FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'static,
    {
        self.core.submit(Box::new(payload), dependencies, qos)
    }

    /// Make an existing pending task additionally wait for another task.
    ///
    /// Mirrors dependency wiring between already-registered tasks; rejected
    /// with [`QueueError::Cycle`] if the edge would close a cycle (the graph
    /// is left untouched) and with [`QueueError::InvalidState`] once `task`
    /// has left `Pending`.
    pub fn add_dependency(&self, task: TaskId, depends_on: TaskId) -> Result<()> {
        self.core.add_dependency(task, depends_on)
    }

    /// Request cancellation. Idempotent; see [`TaskContext::is_cancelled`]
    /// for the cooperative contract with running payloads.
    ///
    /// A request made while the task is executing wins over a successful
    /// return: the task ends `Cancelled` even if the payload never observed
    /// the flag and completed its work.
    pub fn cancel(&self, task: TaskId) -> Result<()> {
        self.core.cancel(task)
    }

    /// Register a callback invoked exactly once with the task's terminal
    /// outcome, on the thread that produced the terminal transition. If the
    /// task is already terminal the callback runs synchronously before this
    /// returns.
    pub fn add_completion_observer<F>(&self, task: TaskId, callback: F) -> Result<()>
    where
        F: FnOnce(TaskEvent) + Send + 'static,
    {
        self.core.add_completion_observer(task, Box::new(callback))
    }

    /// Register a callback invoked on every subsequent state transition of
    /// the task (and once with `Completed` when it ends). Already-terminal
    /// tasks get a single synchronous `Completed` notification.
    pub fn add_state_observer<F>(&self, task: TaskId, observer: F) -> Result<()>
    where
        F: Fn(TaskEvent) + Send + Sync + 'static,
    {
        self.core.add_state_observer(task, Arc::new(observer))
    }

    /// Block until the task reaches a terminal state and return its outcome.
    ///
    /// Calling this from the task's own payload fails fast with
    /// [`QueueError::SelfWait`] instead of deadlocking the worker.
    pub fn wait_for_completion(&self, task: TaskId) -> Result<TaskOutcome> {
        self.core.wait_for_completion(task)
    }

    /// Block until every task that was ready or executing when this was
    /// called has finished, including tasks those completions unblock.
    /// Unrelated work submitted afterwards is not waited for.
    pub fn wait_until_all_finished(&self) {
        self.core.wait_until_all_finished();
    }

    /// Stop claiming ready tasks; running tasks are unaffected.
    pub fn suspend(&self) {
        self.core.suspend();
    }

    /// Re-enable claiming after [`suspend`](TaskQueue::suspend).
    pub fn resume(&self) {
        self.core.resume();
    }

    /// Change the maximum number of simultaneously executing tasks. Takes
    /// effect for future claims; running tasks are never preempted.
    pub fn set_max_concurrency(&self, max: usize) -> Result<()> {
        self.core.set_max_concurrency(max)
    }

    pub fn is_suspended(&self) -> bool {
        self.core.is_suspended()
    }

    pub fn max_concurrency(&self) -> usize {
        self.core.max_concurrency()
    }

    /// Current lifecycle state of a task.
    pub fn task_state(&self, task: TaskId) -> Result<TaskState> {
        self.core.task_state(task)
    }

    /// The recorded failure reason, if the task's payload failed.
    pub fn failure_reason(&self, task: TaskId) -> Result<Option<Arc<anyhow::Error>>> {
        self.core.failure_reason(task)
    }

    /// The task's still-unresolved dependencies (empty once it is ready).
    pub fn dependencies_of(&self, task: TaskId) -> Result<Vec<TaskId>> {
        self.core.dependencies_of(task)
    }

    /// Shut the queue down and join the worker threads.
    ///
    /// Stops submissions and claims, optionally cancels everything that has
    /// not started (see [`ShutdownMode`]), and returns only after every
    /// in-flight execution finished naturally. Safe to call more than once
    /// and from any handle clone.
    pub fn shutdown(&self, mode: ShutdownMode) {
        self.core.shutdown(mode);

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker handle lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}
