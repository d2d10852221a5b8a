// src/config/mod.rs

//! Queue configuration.
//!
//! - [`model`] defines the [`QueueConfig`] structure with serde defaults.
//! - [`loader`] reads it from TOML (a string or a file on disk).
//! - [`validate`] performs semantic validation beyond what serde checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{from_toml_str, load_and_validate, load_from_path};
pub use model::QueueConfig;
pub use validate::validate_config;
