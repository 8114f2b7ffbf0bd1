//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/skyupload/config.toml`
//! - Windows: `%APPDATA%/skyupload/config.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use skyupload_client::UploadOptions;
use skyupload_protocol::constants::GRAPH_BASE_URL;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the folder uploads land in.
    #[serde(default = "default_folder_id")]
    pub folder_id: String,

    /// Graph API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub upload: UploadOptions,
}

fn default_folder_id() -> String {
    "root".into()
}

fn default_base_url() -> String {
    GRAPH_BASE_URL.into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folder_id: default_folder_id(),
            base_url: default_base_url(),
            upload: UploadOptions::default(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("skyupload")
            .join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("skyupload").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/skyupload/config.toml"))
    }
}
