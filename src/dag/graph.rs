// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{QueueError, Result};
use crate::task::TaskId;

/// Directed acyclic mapping of task prerequisites.
///
/// Edges are stored in both directions: `deps` maps a task to the tasks it
/// still waits on, `dependents` maps a task to the tasks waiting on it.
/// Edges are removed as the depended-on tasks reach a terminal state, so
/// `deps` always reflects the *unresolved* dependency set; a task with no
/// entry has nothing left to wait for.
///
/// Acyclicity is enforced at edge insertion: an edge whose target can
/// already reach its source is rejected with [`QueueError::Cycle`] and no
/// partial state is committed. A cycle would mean no involved task could
/// ever become ready.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    deps: HashMap<TaskId, HashSet<TaskId>>,
    dependents: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `task` must wait for `depends_on`.
    ///
    /// Self-edges and edges that would close a cycle are rejected.
    /// Re-adding an existing edge is a no-op.
    pub fn add_edge(&mut self, task: TaskId, depends_on: TaskId) -> Result<()> {
        if task == depends_on {
            return Err(QueueError::Cycle { task, depends_on });
        }

        if self
            .deps
            .get(&task)
            .is_some_and(|set| set.contains(&depends_on))
        {
            return Ok(());
        }

        if self.would_cycle(task, depends_on) {
            return Err(QueueError::Cycle { task, depends_on });
        }

        self.deps.entry(task).or_default().insert(depends_on);
        self.dependents.entry(depends_on).or_default().insert(task);

        debug!(task = %task, depends_on = %depends_on, "dependency edge added");
        Ok(())
    }

    /// Number of unresolved dependencies of `task`.
    pub fn unresolved_count(&self, task: TaskId) -> usize {
        self.deps.get(&task).map_or(0, |set| set.len())
    }

    /// Unresolved dependencies of `task`.
    pub fn dependencies_of(&self, task: TaskId) -> Vec<TaskId> {
        self.deps
            .get(&task)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Tasks currently waiting on `task`.
    pub fn dependents_of(&self, task: TaskId) -> Vec<TaskId> {
        self.dependents
            .get(&task)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove `terminal` from the graph after it reached a terminal state.
    ///
    /// Every dependent loses the corresponding edge; dependents whose
    /// unresolved set becomes empty are returned so the scheduler can move
    /// them to the ready set. Any edges `terminal` itself still held (a
    /// pending task can be cancelled with dependencies outstanding) are
    /// dropped as well.
    pub fn resolve(&mut self, terminal: TaskId) -> Vec<TaskId> {
        let mut unblocked = Vec::new();

        if let Some(waiting) = self.dependents.remove(&terminal) {
            for dependent in waiting {
                if let Some(set) = self.deps.get_mut(&dependent) {
                    set.remove(&terminal);
                    if set.is_empty() {
                        self.deps.remove(&dependent);
                        unblocked.push(dependent);
                    }
                }
            }
        }

        if let Some(outstanding) = self.deps.remove(&terminal) {
            for dep in outstanding {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.remove(&terminal);
                    if set.is_empty() {
                        self.dependents.remove(&dep);
                    }
                }
            }
        }

        if !unblocked.is_empty() {
            debug!(
                task = %terminal,
                unblocked = unblocked.len(),
                "dependency resolved; dependents unblocked"
            );
        }

        unblocked
    }

    /// Would adding the edge `task -> depends_on` close a cycle?
    ///
    /// Edge direction in the petgraph mirror is "depends on": a cycle exists
    /// iff `depends_on` already reaches `task` through its own dependencies.
    fn would_cycle(&self, task: TaskId, depends_on: TaskId) -> bool {
        let mut mirror: DiGraphMap<u64, ()> = DiGraphMap::new();

        mirror.add_node(task.0);
        mirror.add_node(depends_on.0);

        for (from, targets) in self.deps.iter() {
            for to in targets {
                mirror.add_edge(from.0, to.0, ());
            }
        }

        has_path_connecting(&mirror, depends_on.0, task.0, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> TaskId {
        TaskId(n)
    }

    #[test]
    fn resolve_unblocks_dependent_when_last_edge_drops() {
        let mut g = DependencyGraph::new();
        g.add_edge(id(3), id(1)).unwrap();
        g.add_edge(id(3), id(2)).unwrap();

        assert_eq!(g.unresolved_count(id(3)), 2);
        assert!(g.resolve(id(1)).is_empty());
        assert_eq!(g.resolve(id(2)), vec![id(3)]);
        assert_eq!(g.unresolved_count(id(3)), 0);
    }

    #[test]
    fn closing_edge_is_rejected_and_graph_unchanged() {
        let mut g = DependencyGraph::new();
        g.add_edge(id(2), id(1)).unwrap();
        g.add_edge(id(3), id(2)).unwrap();

        // 1 -> 3 would close 1 -> 3 -> 2 -> 1.
        let err = g.add_edge(id(1), id(3)).unwrap_err();
        assert!(matches!(err, QueueError::Cycle { .. }));

        assert_eq!(g.unresolved_count(id(1)), 0);
        assert_eq!(g.dependents_of(id(3)), Vec::<TaskId>::new());
        assert_eq!(g.resolve(id(1)), vec![id(2)]);
    }

    #[test]
    fn self_edge_is_rejected() {
        let mut g = DependencyGraph::new();
        assert!(matches!(
            g.add_edge(id(1), id(1)),
            Err(QueueError::Cycle { .. })
        ));
    }

    #[test]
    fn duplicate_edge_is_a_no_op() {
        let mut g = DependencyGraph::new();
        g.add_edge(id(2), id(1)).unwrap();
        g.add_edge(id(2), id(1)).unwrap();
        assert_eq!(g.unresolved_count(id(2)), 1);
    }

    #[test]
    fn cancelled_pending_task_leaves_no_dangling_edges() {
        let mut g = DependencyGraph::new();
        g.add_edge(id(2), id(1)).unwrap();
        g.add_edge(id(3), id(2)).unwrap();

        // Task 2 is cancelled while still waiting on 1; its dependents are
        // unblocked and its own outstanding edge on 1 is dropped.
        assert_eq!(g.resolve(id(2)), vec![id(3)]);
        assert!(g.dependents_of(id(1)).is_empty());
    }
}
