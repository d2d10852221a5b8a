// src/exec/mod.rs

//! Execution layer.
//!
//! This module owns the worker threads that consume claimed tasks from the
//! scheduling engine, run their payloads, contain payload failures and
//! panics, and report terminal states back to the engine.

pub mod worker;

pub(crate) use worker::spawn_workers;
