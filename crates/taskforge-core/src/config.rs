use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;
use crate::model::DEFAULT_OWNER_FIELD;

/// Minimum password length the hosted provider enforces by default.
pub const DEFAULT_MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub collections: CollectionConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Remote collection names and the ownership tag field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_projects_collection")]
    pub projects: String,
    #[serde(default = "default_tasks_collection")]
    pub tasks: String,
    /// Field holding the owning identity on projects and tasks. Data written
    /// by the earlier web client uses `userId`.
    #[serde(default = "default_owner_field")]
    pub owner_field: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            projects: default_projects_collection(),
            tasks: default_tasks_collection(),
            owner_field: default_owner_field(),
        }
    }
}

/// Project deletion behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Put ownership repairs in the same atomic batch as the deletes
    /// instead of writing them one by one beforehand.
    #[serde(default)]
    pub fold_repairs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_len: default_min_password_len(),
        }
    }
}

/// A config file that exists but does not parse.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse {}: {source}", path.display())]
pub struct ConfigError {
    pub path: PathBuf,
    #[source]
    pub source: toml::de::Error,
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }
}

/// Load config from `path`. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read. A parse failure
/// is a [`ConfigError`], recoverable with `downcast_ref`.
pub fn load_config(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        return Ok(SyncConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<SyncConfig>(&content).map_err(|source| {
        anyhow::Error::new(ConfigError {
            path: path.to_path_buf(),
            source,
        })
    })
}

/// Default config location: `<config_dir>/taskforge/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskforge/config.toml"))
}

/// Load the user config (if any) and apply environment overrides.
///
/// # Errors
///
/// Returns an error if the config file is unreadable or malformed.
pub fn resolve_config(explicit: Option<&Path>) -> Result<SyncConfig> {
    let mut config = match explicit.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => load_config(&path)?,
        None => SyncConfig::default(),
    };

    if let Some(fold) = env::var("TASKFORGE_FOLD_REPAIRS")
        .ok()
        .as_deref()
        .and_then(parse_flag)
    {
        config.cascade.fold_repairs = fold;
    }

    Ok(config)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_projects_collection() -> String {
    "projects".to_string()
}

fn default_tasks_collection() -> String {
    "tasks".to_string()
}

fn default_owner_field() -> String {
    DEFAULT_OWNER_FIELD.to_string()
}

const fn default_min_password_len() -> usize {
    DEFAULT_MIN_PASSWORD_LEN
}
