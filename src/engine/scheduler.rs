// src/engine/scheduler.rs

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread::{self, ThreadId};

use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::dag::DependencyGraph;
use crate::engine::ready::ReadySet;
use crate::errors::{QueueError, Result};
use crate::task::{
    CancelFlag, CompletionObserver, Payload, QosClass, StateObserver, TaskEvent, TaskId,
    TaskOutcome, TaskState,
};

/// How [`shutdown`](crate::TaskQueue::shutdown) treats work that has not
/// started yet. In-flight executions always run to natural completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop claiming and accepting work; leave unclaimed tasks untouched.
    Drain,
    /// Additionally cancel every pending and ready task, firing their
    /// observers, before waiting for in-flight executions.
    CancelPending,
}

/// Callback collected under a lock, to be invoked after all locks are
/// released. Observer code may re-enter the engine (cancel, submit), so it
/// must never run while a lock is held.
pub(crate) type DeferredCall = Box<dyn FnOnce() + Send>;

/// Everything a worker needs to run one claimed task.
pub(crate) struct ClaimedTask {
    pub id: TaskId,
    pub payload: Payload,
    pub cancel: CancelFlag,
    /// Ready → Executing notifications, fired by the worker before running
    /// the payload.
    pub notifications: Vec<DeferredCall>,
}

/// Per-task bookkeeping owned by the scheduler.
struct TaskEntry {
    qos: QosClass,
    state: TaskState,
    payload: Option<Payload>,
    cancel: CancelFlag,
    failure: Option<Arc<anyhow::Error>>,
    completion_observers: Vec<CompletionObserver>,
    state_observers: Vec<StateObserver>,
    executing_thread: Option<ThreadId>,
}

impl TaskEntry {
    /// Terminal outcome, `None` while the task is still live.
    fn outcome(&self) -> Option<TaskOutcome> {
        match self.state {
            TaskState::Finished => Some(match &self.failure {
                Some(err) => TaskOutcome::Failed(err.clone()),
                None => TaskOutcome::Finished,
            }),
            TaskState::Cancelled => Some(TaskOutcome::Cancelled),
            _ => None,
        }
    }
}

/// Mutable scheduler state, guarded by the core's single state mutex.
struct SchedState {
    tasks: HashMap<TaskId, TaskEntry>,
    ready: ReadySet,
    suspended: bool,
    max_concurrency: usize,
    executing: usize,
    shutting_down: bool,
    /// Active `wait_until_all_finished` registrations: the tasks each waiter
    /// is still waiting for. Completions remove themselves and add any
    /// dependents they made ready (snapshot-plus-consequences semantics).
    waits: HashMap<u64, HashSet<TaskId>>,
    next_wait: u64,
}

/// Core scheduling engine shared by the public facade and the worker pool.
///
/// Two pieces of mutable shared state, each with its own lock:
/// - the dependency graph, behind a read-write lock (reachability checks and
///   introspection read; edge insertion and resolution write)
/// - everything else (task table, ready ordering, counters, waits), behind a
///   mutex paired with two condvars: `work_cv` wakes parked workers,
///   `done_cv` wakes completion waiters.
///
/// Lock order is fixed: graph before state, never the other way around.
/// Observer callbacks are always invoked with no lock held.
pub struct QueueCore {
    graph: RwLock<DependencyGraph>,
    state: Mutex<SchedState>,
    work_cv: Condvar,
    done_cv: Condvar,
    next_id: AtomicU64,
    cancel_dependents_on_cancel: bool,
    cancel_dependents_on_failure: bool,
}

impl QueueCore {
    pub(crate) fn new(config: &QueueConfig) -> Self {
        QueueCore {
            graph: RwLock::new(DependencyGraph::new()),
            state: Mutex::new(SchedState {
                tasks: HashMap::new(),
                ready: ReadySet::new(),
                suspended: config.start_suspended,
                max_concurrency: config.effective_max_concurrency(),
                executing: 0,
                shutting_down: false,
                waits: HashMap::new(),
                next_wait: 0,
            }),
            work_cv: Condvar::new(),
            done_cv: Condvar::new(),
            next_id: AtomicU64::new(1),
            cancel_dependents_on_cancel: config.cancel_dependents_on_cancel,
            cancel_dependents_on_failure: config.cancel_dependents_on_failure,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedState> {
        self.state.lock().expect("scheduler state lock poisoned")
    }

    fn graph_write(&self) -> RwLockWriteGuard<'_, DependencyGraph> {
        self.graph.write().expect("dependency graph lock poisoned")
    }

    fn graph_read(&self) -> RwLockReadGuard<'_, DependencyGraph> {
        self.graph.read().expect("dependency graph lock poisoned")
    }

    fn wait_work<'a>(&self, guard: MutexGuard<'a, SchedState>) -> MutexGuard<'a, SchedState> {
        self.work_cv
            .wait(guard)
            .expect("scheduler state lock poisoned")
    }

    fn wait_done<'a>(&self, guard: MutexGuard<'a, SchedState>) -> MutexGuard<'a, SchedState> {
        self.done_cv
            .wait(guard)
            .expect("scheduler state lock poisoned")
    }

    /// Register a new task. Tasks whose dependencies are all terminal (or
    /// absent) become ready immediately and wake one worker.
    pub(crate) fn submit(
        &self,
        payload: Payload,
        deps: &[TaskId],
        qos: QosClass,
    ) -> Result<TaskId> {
        let mut graph = self.graph_write();
        let mut st = self.lock_state();

        if st.shutting_down {
            return Err(QueueError::ShuttingDown);
        }
        for dep in deps {
            if !st.tasks.contains_key(dep) {
                return Err(QueueError::UnknownTask(*dep));
            }
        }

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));

        for dep in deps {
            if st.tasks[dep].state.is_terminal() {
                // Already satisfied; no edge to track.
                continue;
            }
            // A fresh id cannot be depended on yet, so this cannot actually
            // cycle, but the graph enforces the invariant uniformly.
            if let Err(err) = graph.add_edge(id, *dep) {
                graph.resolve(id);
                return Err(err);
            }
        }

        let ready_now = graph.unresolved_count(id) == 0;
        st.tasks.insert(
            id,
            TaskEntry {
                qos,
                state: if ready_now {
                    TaskState::Ready
                } else {
                    TaskState::Pending
                },
                payload: Some(payload),
                cancel: CancelFlag::new(),
                failure: None,
                completion_observers: Vec::new(),
                state_observers: Vec::new(),
                executing_thread: None,
            },
        );
        if ready_now {
            st.ready.push(id, qos);
        }

        debug!(task = %id, qos = ?qos, deps = deps.len(), ready = ready_now, "task submitted");

        drop(st);
        drop(graph);
        if ready_now {
            self.work_cv.notify_one();
        }
        Ok(id)
    }

    /// Make `task` additionally wait for `depends_on`.
    ///
    /// Only valid while `task` is still pending; a terminal `depends_on` is
    /// already satisfied and records nothing. This is the one operation
    /// through which a caller can actually attempt to close a cycle, and the
    /// graph rejects that with no partial state committed.
    pub(crate) fn add_dependency(&self, task: TaskId, depends_on: TaskId) -> Result<()> {
        let mut graph = self.graph_write();
        let st = self.lock_state();

        let entry = st.tasks.get(&task).ok_or(QueueError::UnknownTask(task))?;
        let dep_entry = st
            .tasks
            .get(&depends_on)
            .ok_or(QueueError::UnknownTask(depends_on))?;

        if task == depends_on {
            return Err(QueueError::Cycle { task, depends_on });
        }
        if entry.state != TaskState::Pending {
            return Err(QueueError::InvalidState {
                task,
                state: entry.state,
            });
        }
        if dep_entry.state.is_terminal() {
            return Ok(());
        }

        graph.add_edge(task, depends_on)
    }

    /// Request cancellation of a task. Idempotent.
    ///
    /// Pending and ready tasks transition to `Cancelled` immediately and
    /// their payload is never invoked. For an executing task only the
    /// cooperative flag is raised; the worker records the terminal state
    /// once the payload returns.
    pub(crate) fn cancel(&self, id: TaskId) -> Result<()> {
        let mut graph = self.graph_write();
        let mut st = self.lock_state();

        let state = match st.tasks.get(&id) {
            Some(entry) => entry.state,
            None => return Err(QueueError::UnknownTask(id)),
        };

        match state {
            TaskState::Finished | TaskState::Cancelled => Ok(()),
            TaskState::Executing => {
                if let Some(entry) = st.tasks.get(&id) {
                    entry.cancel.set();
                }
                debug!(task = %id, "cancellation requested for executing task");
                Ok(())
            }
            TaskState::Pending | TaskState::Ready => {
                let calls = self.finalize_locked(&mut graph, &mut st, id, TaskState::Cancelled, None);
                drop(st);
                drop(graph);
                for call in calls {
                    call();
                }
                self.work_cv.notify_all();
                self.done_cv.notify_all();
                Ok(())
            }
        }
    }

    /// Register a callback fired exactly once with the task's terminal
    /// outcome. If the task is already terminal the callback runs
    /// synchronously on the caller's thread before this returns, so no
    /// notification is ever missed or doubled.
    pub(crate) fn add_completion_observer(
        &self,
        id: TaskId,
        callback: CompletionObserver,
    ) -> Result<()> {
        let mut st = self.lock_state();
        let entry = st.tasks.get_mut(&id).ok_or(QueueError::UnknownTask(id))?;
        if let Some(outcome) = entry.outcome() {
            drop(st);
            callback(TaskEvent::Completed { outcome });
            return Ok(());
        }
        entry.completion_observers.push(callback);
        Ok(())
    }

    /// Register a callback fired on every subsequent state transition, plus
    /// once with `Completed` when the task ends. A task that is already
    /// terminal gets a single synchronous `Completed` notification instead.
    pub(crate) fn add_state_observer(&self, id: TaskId, observer: StateObserver) -> Result<()> {
        let mut st = self.lock_state();
        let entry = st.tasks.get_mut(&id).ok_or(QueueError::UnknownTask(id))?;
        if let Some(outcome) = entry.outcome() {
            drop(st);
            observer(TaskEvent::Completed { outcome });
            return Ok(());
        }
        entry.state_observers.push(observer);
        Ok(())
    }

    /// Block until the task reaches a terminal state.
    ///
    /// Rejected with [`QueueError::SelfWait`] when called from the thread
    /// currently executing that very task; blocking there would deadlock
    /// the worker slot forever.
    pub(crate) fn wait_for_completion(&self, id: TaskId) -> Result<TaskOutcome> {
        let mut st = self.lock_state();
        {
            let entry = st.tasks.get(&id).ok_or(QueueError::UnknownTask(id))?;
            if entry.executing_thread == Some(thread::current().id()) {
                return Err(QueueError::SelfWait(id));
            }
        }
        loop {
            if let Some(outcome) = st.tasks.get(&id).and_then(TaskEntry::outcome) {
                return Ok(outcome);
            }
            st = self.wait_done(st);
        }
    }

    /// Block until every task that was ready or executing at call time has
    /// reached a terminal state, including tasks those completions make
    /// ready via dependency resolution. Work submitted independently after
    /// this call starts is not waited for.
    pub(crate) fn wait_until_all_finished(&self) {
        let mut st = self.lock_state();
        // Once claims have stopped, ready tasks can never reach a terminal
        // state; only in-flight work is still worth waiting for.
        let claimable = !st.shutting_down;
        let snapshot: HashSet<TaskId> = st
            .tasks
            .iter()
            .filter(|(_, entry)| match entry.state {
                TaskState::Executing => true,
                TaskState::Ready => claimable,
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        if snapshot.is_empty() {
            return;
        }

        let wait_id = st.next_wait;
        st.next_wait += 1;
        debug!(wait_id, tasks = snapshot.len(), "waiting for ready and in-flight tasks");
        st.waits.insert(wait_id, snapshot);

        loop {
            if st.waits.get(&wait_id).map_or(true, HashSet::is_empty) {
                st.waits.remove(&wait_id);
                return;
            }
            st = self.wait_done(st);
        }
    }

    /// Stop claiming ready tasks. Executing tasks run to completion and
    /// readiness transitions continue while suspended.
    pub(crate) fn suspend(&self) {
        let mut st = self.lock_state();
        if !st.suspended {
            st.suspended = true;
            info!("queue suspended");
        }
    }

    /// Re-enable claiming.
    pub(crate) fn resume(&self) {
        let mut st = self.lock_state();
        if st.suspended {
            st.suspended = false;
            drop(st);
            info!("queue resumed");
            self.work_cv.notify_all();
        }
    }

    /// Change the execution limit. Applies to future claims only; running
    /// tasks are never preempted.
    pub(crate) fn set_max_concurrency(&self, max: usize) -> Result<()> {
        if max == 0 {
            return Err(QueueError::Config("max_concurrency must be >= 1".into()));
        }
        let mut st = self.lock_state();
        let previous = st.max_concurrency;
        st.max_concurrency = max;
        drop(st);
        debug!(previous, max, "max concurrency changed");
        if max > previous {
            self.work_cv.notify_all();
        }
        Ok(())
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.lock_state().suspended
    }

    pub(crate) fn max_concurrency(&self) -> usize {
        self.lock_state().max_concurrency
    }

    pub(crate) fn task_state(&self, id: TaskId) -> Result<TaskState> {
        self.lock_state()
            .tasks
            .get(&id)
            .map(|entry| entry.state)
            .ok_or(QueueError::UnknownTask(id))
    }

    pub(crate) fn failure_reason(&self, id: TaskId) -> Result<Option<Arc<anyhow::Error>>> {
        self.lock_state()
            .tasks
            .get(&id)
            .map(|entry| entry.failure.clone())
            .ok_or(QueueError::UnknownTask(id))
    }

    /// Unresolved dependencies of a task.
    pub(crate) fn dependencies_of(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let graph = self.graph_read();
        let st = self.lock_state();
        if !st.tasks.contains_key(&id) {
            return Err(QueueError::UnknownTask(id));
        }
        Ok(graph.dependencies_of(id))
    }

    /// Stop accepting submissions and claims, optionally cancel queued work,
    /// and block until every in-flight execution has finished naturally.
    /// Safe to call more than once.
    pub(crate) fn shutdown(&self, mode: ShutdownMode) {
        let calls = {
            let mut graph = self.graph_write();
            let mut st = self.lock_state();
            if !st.shutting_down {
                st.shutting_down = true;
                info!(?mode, "queue shutting down");
            }

            let mut calls = Vec::new();
            if mode == ShutdownMode::CancelPending {
                let doomed: Vec<TaskId> = st
                    .tasks
                    .iter()
                    .filter(|(_, entry)| {
                        matches!(entry.state, TaskState::Pending | TaskState::Ready)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for id in doomed {
                    calls.extend(self.finalize_locked(
                        &mut graph,
                        &mut st,
                        id,
                        TaskState::Cancelled,
                        None,
                    ));
                }
            }

            // Tasks that have not started will never be claimed now, so
            // waiters counting on them must stop doing so (under
            // CancelPending nothing is left to strike out here).
            let stranded: Vec<TaskId> = st
                .tasks
                .iter()
                .filter(|(_, entry)| {
                    matches!(entry.state, TaskState::Pending | TaskState::Ready)
                })
                .map(|(id, _)| *id)
                .collect();
            for remaining in st.waits.values_mut() {
                for id in &stranded {
                    remaining.remove(id);
                }
            }
            calls
        };

        for call in calls {
            call();
        }
        self.work_cv.notify_all();
        self.done_cv.notify_all();

        let mut st = self.lock_state();
        while st.executing > 0 {
            st = self.wait_done(st);
        }
    }

    /// Worker entry point: block until a task can be claimed, or return
    /// `None` once the queue is shutting down.
    pub(crate) fn claim_next(&self) -> Option<ClaimedTask> {
        let mut st = self.lock_state();
        loop {
            if st.shutting_down {
                return None;
            }
            if let Some(claim) = Self::claim_next_locked(&mut st) {
                return Some(claim);
            }
            st = self.wait_work(st);
        }
    }

    /// Claim the highest-priority live ready task for the calling thread,
    /// if claiming is allowed right now. Atomic under the state lock: no
    /// two workers can claim the same task.
    fn claim_next_locked(st: &mut SchedState) -> Option<ClaimedTask> {
        if st.suspended || st.executing >= st.max_concurrency {
            return None;
        }

        while let Some(id) = st.ready.pop() {
            let claimed = {
                let Some(entry) = st.tasks.get_mut(&id) else {
                    continue;
                };
                if entry.state != TaskState::Ready {
                    // Stale heap entry: the task was cancelled while ready.
                    continue;
                }
                entry.state = TaskState::Executing;
                entry.executing_thread = Some(thread::current().id());
                let payload = entry.payload.take().expect("ready task has a payload");
                let cancel = entry.cancel.clone();
                let mut notifications: Vec<DeferredCall> = Vec::new();
                for observer in entry.state_observers.iter().cloned() {
                    let event = TaskEvent::StateChanged {
                        from: TaskState::Ready,
                        to: TaskState::Executing,
                    };
                    notifications.push(Box::new(move || observer(event)));
                }
                ClaimedTask {
                    id,
                    payload,
                    cancel,
                    notifications,
                }
            };
            st.executing += 1;
            return Some(claimed);
        }
        None
    }

    /// Record the terminal state of a task a worker just finished, resolve
    /// dependents, and wake everyone who might care.
    pub(crate) fn finish_execution(
        &self,
        id: TaskId,
        to: TaskState,
        failure: Option<Arc<anyhow::Error>>,
    ) {
        let mut graph = self.graph_write();
        let mut st = self.lock_state();
        st.executing -= 1;
        let calls = self.finalize_locked(&mut graph, &mut st, id, to, failure);
        drop(st);
        drop(graph);
        for call in calls {
            call();
        }
        self.work_cv.notify_all();
        self.done_cv.notify_all();
    }

    /// Move a task (and, with cascade policies enabled, its pending
    /// dependents) to a terminal state under both locks.
    ///
    /// Returns the observer invocations to perform after unlocking. By
    /// default a terminal dependency unblocks dependents regardless of
    /// success: dependencies gate ordering, not outcome.
    fn finalize_locked(
        &self,
        graph: &mut DependencyGraph,
        st: &mut SchedState,
        id: TaskId,
        to: TaskState,
        failure: Option<Arc<anyhow::Error>>,
    ) -> Vec<DeferredCall> {
        let mut calls: Vec<DeferredCall> = Vec::new();
        let mut stack = vec![(id, to, failure)];

        while let Some((id, to, failure)) = stack.pop() {
            let (from, outcome, completion, observers) = {
                let Some(entry) = st.tasks.get_mut(&id) else {
                    continue;
                };
                if entry.state.is_terminal() {
                    continue;
                }
                let from = entry.state;
                entry.state = to;
                entry.failure = failure;
                entry.payload = None;
                entry.executing_thread = None;
                let outcome = entry.outcome().expect("terminal state was just set");
                (
                    from,
                    outcome,
                    std::mem::take(&mut entry.completion_observers),
                    entry.state_observers.clone(),
                )
            };

            debug!(task = %id, from = %from, to = %to, "task reached terminal state");

            for observer in &observers {
                let observer = Arc::clone(observer);
                let event = TaskEvent::StateChanged { from, to };
                calls.push(Box::new(move || observer(event)));
            }
            for callback in completion {
                let event = TaskEvent::Completed {
                    outcome: outcome.clone(),
                };
                calls.push(Box::new(move || callback(event)));
            }
            // State observers also get the terminal outcome, after the
            // transition they just saw.
            for observer in observers {
                let event = TaskEvent::Completed {
                    outcome: outcome.clone(),
                };
                calls.push(Box::new(move || observer(event)));
            }

            let cascade = match &outcome {
                TaskOutcome::Cancelled => self.cancel_dependents_on_cancel,
                TaskOutcome::Failed(_) => self.cancel_dependents_on_failure,
                TaskOutcome::Finished => false,
            };
            let cascade_targets = if cascade {
                graph.dependents_of(id)
            } else {
                Vec::new()
            };

            let unblocked = graph.resolve(id);

            let mut newly_ready: Vec<TaskId> = Vec::new();
            if cascade {
                for dependent in cascade_targets {
                    debug!(task = %dependent, cancelled_by = %id, "cascading cancellation to dependent");
                    stack.push((dependent, TaskState::Cancelled, None));
                }
            } else {
                for dependent in unblocked {
                    let ready = {
                        let Some(entry) = st.tasks.get_mut(&dependent) else {
                            continue;
                        };
                        if entry.state != TaskState::Pending {
                            continue;
                        }
                        entry.state = TaskState::Ready;
                        (entry.qos, entry.state_observers.clone())
                    };
                    let (qos, observers) = ready;
                    st.ready.push(dependent, qos);
                    newly_ready.push(dependent);
                    debug!(task = %dependent, "dependencies satisfied; task ready");
                    for observer in observers {
                        let event = TaskEvent::StateChanged {
                            from: TaskState::Pending,
                            to: TaskState::Ready,
                        };
                        calls.push(Box::new(move || observer(event)));
                    }
                }
            }

            // Newly ready tasks extend the waits that contained the task
            // that unblocked them, unless claims have already stopped (they
            // would then never leave the set).
            let claims_stopped = st.shutting_down;
            for remaining in st.waits.values_mut() {
                if remaining.remove(&id) && !claims_stopped {
                    remaining.extend(newly_ready.iter().copied());
                }
            }
        }

        calls
    }
}
