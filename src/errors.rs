// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Every error the engine detects itself (cycles, invalid states, self-waits)
//! is returned synchronously to the caller of the offending operation.
//! Failures *inside* a task payload are never surfaced through this enum;
//! they are recorded on the task and retrievable via
//! [`failure_reason`](crate::TaskQueue::failure_reason).

use thiserror::Error;

use crate::task::{TaskId, TaskState};

#[derive(Error, Debug)]
pub enum QueueError {
    /// Adding the dependency edge would make the graph cyclic. Nothing was
    /// committed; the caller must fix the dependency set.
    #[error("making task {task} depend on task {depends_on} would create a cycle")]
    Cycle { task: TaskId, depends_on: TaskId },

    /// The task id was never issued by this queue.
    #[error("task {0} is not known to this queue")]
    UnknownTask(TaskId),

    /// The operation is meaningless for the task's current state
    /// (e.g. adding a dependency to a task that already started).
    #[error("operation not valid while task {task} is {state}")]
    InvalidState { task: TaskId, state: TaskState },

    /// A payload tried to wait for its own completion, which would deadlock
    /// the worker slot. Detected via thread identity and returned
    /// immediately instead.
    #[error("task {0} cannot wait for its own completion")]
    SelfWait(TaskId),

    /// The queue has been shut down and accepts no new work.
    #[error("queue is shutting down")]
    ShuttingDown,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
