// src/engine/ready.rs

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::task::{QosClass, TaskId};

/// One claimable entry in the ready ordering.
///
/// Ordered by QoS rank (higher first), then submission sequence (lower
/// first), so the heap maximum is always the next task to claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadyEntry {
    pub qos_rank: u8,
    pub seq: u64,
    pub id: TaskId,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.qos_rank
            .cmp(&other.qos_rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ready set: the tasks eligible for claiming, in claim order.
///
/// Entries are not removed when a ready task is cancelled; the scheduler
/// re-checks the task's state at pop time and skips stale entries, which
/// keeps cancellation O(1).
#[derive(Debug, Default)]
pub(crate) struct ReadySet {
    heap: BinaryHeap<ReadyEntry>,
}

impl ReadySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: TaskId, qos: QosClass) {
        self.heap.push(ReadyEntry {
            qos_rank: qos.rank(),
            seq: id.seq(),
            id,
        });
    }

    /// Next entry in claim order, possibly stale.
    pub fn pop(&mut self) -> Option<TaskId> {
        self.heap.pop().map(|entry| entry.id)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
