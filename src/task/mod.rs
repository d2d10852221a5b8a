// src/task/mod.rs

//! Task identity, lifecycle state, priority classes and payload types.
//!
//! A task is a unit of schedulable work. The queue owns its lifecycle; the
//! worker pool holds a transient execution handle while running it. State
//! moves monotonically along `Pending → Ready → Executing → {Finished |
//! Cancelled}`, with `Cancelled` reachable from any non-terminal state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Opaque task identifier, unique per queue.
///
/// Ids are issued from an atomic counter at submission time, so they double
/// as the stable submission sequence number used for FIFO tie-breaking
/// among tasks of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// The submission sequence number backing this id.
    pub(crate) fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, but at least one dependency has not reached a terminal
    /// state yet.
    Pending,
    /// All dependencies terminal; eligible to be claimed by a worker.
    Ready,
    /// Claimed by a worker; the payload is running.
    Executing,
    /// The payload ran to completion (possibly with a recorded failure).
    Finished,
    /// Cancelled before execution, or the payload observed the cancellation
    /// flag and exited early.
    Cancelled,
}

impl TaskState {
    /// `Finished` and `Cancelled` are terminal; no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Executing => "executing",
            TaskState::Finished => "finished",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Quality-of-service class: an ordering hint for which ready task a free
/// worker claims next.
///
/// Claim priority descends from `Interactive` to `Background`; within one
/// class, claim order follows submission order (stable FIFO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QosClass {
    Interactive,
    Initiated,
    #[default]
    Default,
    Utility,
    Background,
}

impl QosClass {
    /// Numeric rank used by the ready ordering; higher claims first.
    pub(crate) fn rank(self) -> u8 {
        match self {
            QosClass::Interactive => 4,
            QosClass::Initiated => 3,
            QosClass::Default => 2,
            QosClass::Utility => 1,
            QosClass::Background => 0,
        }
    }
}

/// Terminal outcome of a task, as reported to waiters and observers.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The payload returned `Ok`.
    Finished,
    /// The payload returned an error (or panicked); the task still counts as
    /// finished for dependency gating, with the reason recorded here.
    Failed(Arc<anyhow::Error>),
    /// The task was cancelled before or during execution.
    Cancelled,
}

/// Event delivered to observers.
///
/// State observers receive every `StateChanged`; completion observers
/// receive exactly one `Completed`.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    StateChanged { from: TaskState, to: TaskState },
    Completed { outcome: TaskOutcome },
}

/// Cooperative cancellation flag shared between the engine and a payload.
///
/// The engine never terminates a running payload; it only raises this flag.
/// A payload that wants to be cancellable checks it at safe points (via
/// [`TaskContext::is_cancelled`]) and returns early.
#[derive(Debug, Clone)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn new() -> Self {
        CancelFlag(Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Execution context handed to a payload by the worker that runs it.
pub struct TaskContext {
    id: TaskId,
    cancel: CancelFlag,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, cancel: CancelFlag) -> Self {
        Self { id, cancel }
    }

    /// The id of the task this payload belongs to.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether cancellation has been requested for this task.
    ///
    /// Long-running payloads should poll this at safe points and return
    /// early when it turns true.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }
}

/// The executable unit of work carried by a task.
pub(crate) type Payload =
    Box<dyn FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'static>;

/// Callback fired exactly once when a task reaches a terminal state.
pub(crate) type CompletionObserver = Box<dyn FnOnce(TaskEvent) + Send + 'static>;

/// Callback fired on every state transition of a task.
pub(crate) type StateObserver = Arc<dyn Fn(TaskEvent) + Send + Sync + 'static>;
