// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawConfigFile, RunnerConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to get
/// a usable [`RunnerConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file, fill in defaults from [`RunnerConfig::base`]
/// and validate the result.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RunnerConfig> {
    let raw = load_from_path(&path)?;
    RunnerConfig::try_from(raw)
}

/// `Runner.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Runner.toml")
}
