pub mod settings;

pub use settings::{GitSettings, Settings, StackSettings, StoreSettings};

use crate::errors::{GrapheneError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration directory
pub const HOME_ENV: &str = "GRAPHENE_HOME";

/// Get the Graphene configuration directory (`$GRAPHENE_HOME` or `~/.graphene/`)
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    let home_dir =
        dirs::home_dir().ok_or_else(|| GrapheneError::config("Could not find home directory"))?;
    Ok(home_dir.join(".graphene"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        fs::create_dir_all(config_dir).map_err(|e| {
            GrapheneError::config(format!("Failed to create config directory: {e}"))
        })?;
    }
    Ok(())
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.json")
}

/// Where the stack store lives for the given settings
pub fn store_path(config_dir: &Path, settings: &Settings) -> PathBuf {
    settings
        .store
        .path
        .clone()
        .unwrap_or_else(|| config_dir.join("graphene.json"))
}

/// Load settings from the configuration directory, creating the directory if needed
pub fn load_settings(config_dir: &Path) -> Result<Settings> {
    ensure_config_dir(config_dir)?;
    let settings = Settings::load_from_file(&settings_path(config_dir))?;
    settings.validate()?;
    tracing::debug!("Loaded settings from {}", config_dir.display());
    Ok(settings)
}
