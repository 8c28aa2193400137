//! Configuration management for Signalroom.

mod settings;

pub use settings::{ApiConfig, Config, LifecycleConfig, StorageConfig};

use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "signalroom", "signalroom")
        .ok_or_else(|| Error::config("Could not determine project directories"))
}

/// Get the configuration directory path.
pub fn config_dir() -> Result<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path.
pub fn data_dir() -> Result<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the log directory path.
pub fn log_dir() -> Result<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}
