// src/config/mod.rs

//! Runner configuration.
//!
//! - `model.rs`: the TOML data model and the resolved [`RunnerConfig`].
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: merge with defaults and check invariants.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    GitRepoSpec, ImageStreamRef, RawConfigFile, RunnerConfig, RESULTS_PORT, RESULTS_PORT_NAME,
};
pub use validate::validate_config;
