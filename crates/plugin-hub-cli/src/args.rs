use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "plugin-hub")]
#[command(about = "Discover, install and track marketplace plugins")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base directory (default: ~/.plugin-hub)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List installed plugins
    List,

    /// List remote plugins that can be installed
    Available,

    /// Show MCP servers declared by installed plugins
    Mcp,

    /// Show component directories of an installed plugin
    Paths {
        /// Marketplace name
        marketplace: String,

        /// Plugin name
        plugin: String,
    },

    /// Clone a plugin and record it as installed
    Install {
        /// Marketplace name
        marketplace: String,

        /// Plugin name
        plugin: String,

        /// Repository URL (default: the URL declared by the marketplace)
        url: Option<String>,
    },

    /// Remove an installed plugin
    Uninstall {
        /// Marketplace name
        marketplace: String,

        /// Plugin name
        plugin: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., discovery.cache_ttl_secs)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., install.clone_timeout_secs)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Create config file with commented defaults
    Init,
}
