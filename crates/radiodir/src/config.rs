use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

/// Where and how the station directory service is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// DNS SRV name listing the interchangeable directory mirrors.
    #[serde(default = "default_discovery_name")]
    pub discovery_name: String,
    /// Scheme prefixed to every SRV target hostname.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Fixed mirror base URL.  When set, SRV discovery is skipped entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<String>,
    /// Country used by refresh when the settings store has no `radio.country`.
    #[serde(default = "default_country")]
    pub default_country: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local snapshot of the last directory refresh.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,
    /// Key-value store holding favorites and the home country.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Update station status before the player confirms a command.
    #[serde(default = "default_optimistic_status")]
    pub optimistic_status: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            discovery_name: default_discovery_name(),
            scheme: default_scheme(),
            mirror: None,
            default_country: default_country(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            snapshot_file: default_snapshot_file(),
            settings_file: default_settings_file(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            optimistic_status: default_optimistic_status(),
        }
    }
}

fn default_discovery_name() -> String {
    "_api._tcp.radio-browser.info".to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_country() -> String {
    "China".to_string()
}

fn default_user_agent() -> String {
    format!("radiodir/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DEFAULT_DAEMON_PORT
}

fn default_snapshot_file() -> PathBuf {
    platform::data_dir().join("db.json")
}

fn default_settings_file() -> PathBuf {
    platform::config_dir().join("settings.toml")
}

fn default_optimistic_status() -> bool {
    true
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
