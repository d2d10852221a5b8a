// src/config/validate.rs

use crate::config::model::QueueConfig;
use crate::errors::{QueueError, Result};

/// Run semantic validation against a queue configuration.
///
/// Checks:
/// - `workers >= 1` (a pool with no slots can never execute anything)
/// - `max_concurrency >= 1` when set explicitly
pub fn validate_config(config: &QueueConfig) -> Result<()> {
    if config.workers == 0 {
        return Err(QueueError::Config(
            "workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if config.max_concurrency == Some(0) {
        return Err(QueueError::Config(
            "max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
