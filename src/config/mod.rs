// src/config/mod.rs

//! Configuration for rundag.
//!
//! Responsibilities:
//! - Read runtime settings from the environment (`env.rs`).
//! - Define the TOML-backed supervisor config (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it (`validate.rs`).

pub mod env;
pub mod loader;
pub mod model;
pub mod validate;

pub use env::EnvConfig;
pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, RawConfigFile, StorageSection, SupervisorSection};
