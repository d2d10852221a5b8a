// src/dag/mod.rs

//! Dependency graph for task prerequisites.
//!
//! - [`graph`] holds the directed acyclic mapping from a task to the tasks
//!   it depends on (and the reverse mapping), rejects edges that would close
//!   a cycle, and resolves dependents as dependencies reach terminal states.

pub mod graph;

pub use graph::DependencyGraph;
