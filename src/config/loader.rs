// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ConfigFile, QueueConfig};
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Parse a [`QueueConfig`] from a TOML document.
///
/// The document may be empty or omit the `[queue]` section entirely, in
/// which case defaults apply. This only deserializes; use
/// [`load_and_validate`] (or [`validate_config`] directly) for semantic
/// checks.
pub fn from_toml_str(contents: &str) -> Result<QueueConfig> {
    let file: ConfigFile = toml::from_str(contents)?;
    Ok(file.queue.unwrap_or_default())
}

/// Read a [`QueueConfig`] from a TOML file on disk.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<QueueConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), "loaded queue config file");
    from_toml_str(&contents)
}

/// Read a config file and run semantic validation.
///
/// This is the recommended entry point when configuring a queue from disk:
/// serde applies defaults, [`validate_config`] rejects nonsensical values.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<QueueConfig> {
    let config = load_from_path(path)?;
    validate_config(&config)?;
    Ok(config)
}
