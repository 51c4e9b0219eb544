use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PluginHubError, Result};

const CONFIG_FILE: &str = "config.toml";
const PLUGINS_DIR: &str = "plugins";
const BASE_DIR_NAME: &str = ".plugin-hub";

pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_CLONE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_GIT_PROGRAM: &str = "git";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# plugin-hub configuration file
# Location: ~/.plugin-hub/config.toml

[paths]
# Root holding marketplaces/, cache/ and installed_plugins.json
# Default: <base_dir>/plugins
# plugins_dir = "/home/me/.plugin-hub/plugins"

[discovery]
# Seconds a discovery result is reused before marketplaces are rescanned
cache_ttl_secs = 30

[install]
# Upper bound for a single `git clone`
clone_timeout_secs = 120
# Source-control client used for clone and revision lookup
git_program = "git"
"#;

/// `~/.plugin-hub`
pub fn default_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(PluginHubError::HomeNotFound)?;
    Ok(home.join(BASE_DIR_NAME))
}

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    /// Overrides `<base_dir>/plugins`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,

    #[serde(default = "default_git_program")]
    pub git_program: String,
}

impl InstallConfig {
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            clone_timeout_secs: DEFAULT_CLONE_TIMEOUT_SECS,
            git_program: default_git_program(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_clone_timeout() -> u64 {
    DEFAULT_CLONE_TIMEOUT_SECS
}

fn default_git_program() -> String {
    DEFAULT_GIT_PROGRAM.to_string()
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| PluginHubError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Effective plugins root for this base directory
    pub fn plugins_dir(&self, base_dir: &Path) -> PathBuf {
        self.paths
            .plugins_dir
            .clone()
            .unwrap_or_else(|| base_dir.join(PLUGINS_DIR))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery.cache_ttl_secs)
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "paths.plugins_dir" => Some(
                self.paths
                    .plugins_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            "discovery.cache_ttl_secs" => Some(self.discovery.cache_ttl_secs.to_string()),
            "install.clone_timeout_secs" => Some(self.install.clone_timeout_secs.to_string()),
            "install.git_program" => Some(self.install.git_program.clone()),
            _ => None,
        }
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "paths.plugins_dir" => {
                self.paths.plugins_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "discovery.cache_ttl_secs" => {
                self.discovery.cache_ttl_secs = parse_secs(key, value)?;
            }
            "install.clone_timeout_secs" => {
                let secs = parse_secs(key, value)?;
                if secs == 0 {
                    return Err(PluginHubError::InvalidConfigValue {
                        key: key.to_string(),
                        message: "timeout must be greater than zero".to_string(),
                    });
                }
                self.install.clone_timeout_secs = secs;
            }
            "install.git_program" => {
                if value.is_empty() {
                    return Err(PluginHubError::InvalidConfigValue {
                        key: key.to_string(),
                        message: "program cannot be empty".to_string(),
                    });
                }
                self.install.git_program = value.to_string();
            }
            _ => {
                return Err(PluginHubError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "paths.plugins_dir",
            "discovery.cache_ttl_secs",
            "install.clone_timeout_secs",
            "install.git_program",
        ]
        .iter()
        .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
        .collect()
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|e| PluginHubError::InvalidConfigValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}
