//! Configuration management for floorsync.

use anyhow::{Context, Result};
use floorsync_client::SessionConfig;
use floorsync_types::PresenceUser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file in the platform config directory.
pub const CONFIG_FILE: &str = "floorsync.toml";

/// Who this operator is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Account identifier.
    #[serde(default = "default_user_id")]
    pub id: String,
    /// Display name shown to other operators.
    #[serde(default = "default_user_name")]
    pub name: String,
    /// Optional role label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

fn default_user_id() -> String {
    "operator".to_string()
}

fn default_user_name() -> String {
    "Operator".to_string()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: default_user_id(),
            name: default_user_name(),
            role: None,
        }
    }
}

impl UserConfig {
    /// The presence identity for this operator.
    pub fn presence_user(&self) -> PresenceUser {
        let user = PresenceUser::new(self.id.as_str(), self.name.as_str());
        match &self.role {
            Some(role) => user.with_role(role.as_str()),
            None => user,
        }
    }
}

/// Contents of `floorsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// `[user]` table.
    #[serde(default)]
    pub user: UserConfig,
    /// `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
}

impl CliConfig {
    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, the platform config file
    /// is used when present and defaults otherwise. Returns the file that
    /// was read, if any.
    pub async fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok((Self::default(), None)),
            },
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok((config, Some(path)))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// `floorsync.toml` in the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "floorsync", "floorsync")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
