// src/exec/worker.rs

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::engine::QueueCore;
use crate::errors::Result;
use crate::task::{TaskContext, TaskState};

/// Spawn the fixed set of worker threads backing a queue.
///
/// Each worker runs a claim loop against the engine: block until a task can
/// be claimed, execute it, report the terminal state, repeat. Workers exit
/// when the engine starts shutting down.
pub(crate) fn spawn_workers(core: &Arc<QueueCore>, count: usize) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(count);
    for slot in 0..count {
        let core = Arc::clone(core);
        let handle = thread::Builder::new()
            .name(format!("taskdag-worker-{slot}"))
            .spawn(move || worker_loop(core, slot))?;
        handles.push(handle);
    }
    info!(workers = count, "worker pool started");
    Ok(handles)
}

fn worker_loop(core: Arc<QueueCore>, slot: usize) {
    debug!(slot, "worker started");

    while let Some(claimed) = core.claim_next() {
        for notify in claimed.notifications {
            notify();
        }

        debug!(task = %claimed.id, slot, "task claimed; executing payload");
        let ctx = TaskContext::new(claimed.id, claimed.cancel.clone());

        // Payload failures and panics are contained here: they become the
        // task's recorded failure reason, never the slot's death.
        let result = panic::catch_unwind(AssertUnwindSafe(|| (claimed.payload)(&ctx)));

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                warn!(task = %claimed.id, error = %err, "task payload failed");
                Some(Arc::new(err))
            }
            Err(panic_payload) => {
                let msg = panic_message(panic_payload.as_ref());
                warn!(task = %claimed.id, panic = %msg, "task payload panicked");
                Some(Arc::new(anyhow!("task payload panicked: {msg}")))
            }
        };

        // A payload that observed the cancellation flag (or was flagged at
        // any point while executing) ends Cancelled, not Finished.
        let terminal = if claimed.cancel.is_set() {
            TaskState::Cancelled
        } else {
            TaskState::Finished
        };

        debug!(task = %claimed.id, slot, state = %terminal, "task execution ended");
        core.finish_execution(claimed.id, terminal, failure);
    }

    debug!(slot, "worker stopping");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
