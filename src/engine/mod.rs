// src/engine/mod.rs

//! Scheduling engine.
//!
//! This module ties together:
//! - the ready ordering (priority first, FIFO within equal priority)
//! - the core state machine that owns every task's lifecycle, claims tasks
//!   for workers, propagates terminal states through the dependency graph,
//!   and parks waiters on condition variables

pub mod ready;
pub mod scheduler;

pub use scheduler::{QueueCore, ShutdownMode};
