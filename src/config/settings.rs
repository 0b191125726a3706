use crate::errors::{GrapheneError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub stack: StackSettings,
    #[serde(default)]
    pub git: GitSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Override for the store document location; defaults to `<config dir>/graphene.json`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSettings {
    /// Prefix for generated stack names
    pub name_prefix: String,
    /// Branch names offered as base branches by `gr init`
    pub base_candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSettings {
    /// Remote whose URL names the repository
    pub remote: String,
    /// Seconds to wait for the repository lock before giving up
    pub lock_timeout_secs: u64,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            name_prefix: "stack/".to_string(),
            base_candidates: vec![
                "main".to_string(),
                "master".to_string(),
                "develop".to_string(),
                "development".to_string(),
            ],
        }
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            lock_timeout_secs: 2,
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when it does not exist
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| GrapheneError::config(format!("Failed to read config file: {e}")))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| GrapheneError::config(format!("Failed to parse config file: {e}")))?;

        Ok(settings)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        crate::utils::atomic_file::write_json(path, self)
    }

    /// Name for a stack whose first branch is `branch`
    pub fn stack_name_for(&self, branch: &str) -> String {
        format!("{}{}", self.stack.name_prefix, branch)
    }

    /// Update a configuration value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, field) = split_key(key)?;

        match (section, field) {
            ("store", "path") => {
                self.store.path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            ("stack", "name_prefix") => self.stack.name_prefix = value.to_string(),
            ("stack", "base_candidates") => {
                self.stack.base_candidates = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ("git", "remote") => self.git.remote = value.to_string(),
            ("git", "lock_timeout_secs") => {
                self.git.lock_timeout_secs = value
                    .parse()
                    .map_err(|_| GrapheneError::config(format!("Invalid number: {value}")))?;
            }
            _ => return Err(GrapheneError::config(format!("Unknown config key: {key}"))),
        }

        Ok(())
    }

    /// Get a configuration value by dotted key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let (section, field) = split_key(key)?;

        let value = match (section, field) {
            ("store", "path") => self
                .store
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ("stack", "name_prefix") => self.stack.name_prefix.clone(),
            ("stack", "base_candidates") => self.stack.base_candidates.join(","),
            ("git", "remote") => self.git.remote.clone(),
            ("git", "lock_timeout_secs") => self.git.lock_timeout_secs.to_string(),
            _ => return Err(GrapheneError::config(format!("Unknown config key: {key}"))),
        };

        Ok(value)
    }

    pub fn keys() -> &'static [&'static str] {
        &[
            "store.path",
            "stack.name_prefix",
            "stack.base_candidates",
            "git.remote",
            "git.lock_timeout_secs",
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.stack.name_prefix.chars().any(char::is_whitespace) {
            return Err(GrapheneError::config(
                "stack.name_prefix must not contain whitespace",
            ));
        }

        if self.stack.base_candidates.is_empty() {
            return Err(GrapheneError::config(
                "stack.base_candidates must name at least one branch",
            ));
        }

        if self.git.remote.trim().is_empty() {
            return Err(GrapheneError::config("git.remote must not be empty"));
        }

        Ok(())
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .filter(|(section, field)| !section.is_empty() && !field.contains('.'))
        .ok_or_else(|| GrapheneError::config(format!("Invalid config key format: {key}")))
}
