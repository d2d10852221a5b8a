// src/config/model.rs

use serde::Deserialize;

/// Queue configuration, either built in code or read from a `[queue]`
/// section in TOML:
///
/// ```toml
/// [queue]
/// workers = 4
/// max_concurrency = 2
/// start_suspended = false
/// cancel_dependents_on_cancel = false
/// cancel_dependents_on_failure = false
/// ```
///
/// All fields are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Number of worker threads in the pool.
    ///
    /// Defaults to the host's available parallelism (at least 1).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of simultaneously executing tasks.
    ///
    /// If `None`, falls back to `workers`. A limit above `workers` is legal
    /// but has no additional effect.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Start with claiming disabled; call `resume()` to begin executing.
    #[serde(default)]
    pub start_suspended: bool,

    /// When a task is cancelled, cancel its pending dependents too instead
    /// of unblocking them.
    ///
    /// Off by default: a terminal dependency satisfies the gate regardless
    /// of how it ended.
    #[serde(default)]
    pub cancel_dependents_on_cancel: bool,

    /// When a task's payload fails, cancel its pending dependents instead
    /// of unblocking them. Off by default, same reasoning as above.
    #[serde(default)]
    pub cancel_dependents_on_failure: bool,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_concurrency: None,
            start_suspended: false,
            cancel_dependents_on_cancel: false,
            cancel_dependents_on_failure: false,
        }
    }
}

impl QueueConfig {
    /// Effective execution limit: the configured value, or `workers`.
    pub fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(self.workers)
    }
}

/// Top-level TOML document: everything lives under `[queue]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub queue: Option<QueueConfig>,
}
