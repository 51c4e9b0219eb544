use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginHubError {
    #[error("Plugin not found: {name}@{marketplace}")]
    PluginNotFound { name: String, marketplace: String },

    #[error("Invalid name: '{name}' - {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Failed to parse {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Config key not found: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid config value for {key}: {message}")]
    InvalidConfigValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Git error: {0}")]
    Git(String),

    #[error("git clone timed out after {seconds}s")]
    CloneTimeout { seconds: u64 },
}

pub type Result<T> = std::result::Result<T, PluginHubError>;

impl PluginHubError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PluginNotFound { .. } => 2,
            Self::InvalidName { .. } => 3,
            Self::Git(_) | Self::CloneTimeout { .. } => 4,
            Self::ConfigParse { .. }
            | Self::ConfigKeyNotFound { .. }
            | Self::InvalidConfigValue { .. } => 5,
            _ => 1,
        }
    }
}
