//! Plugin Manager
//!
//! Composition root for the plugin subsystem. Owns the registry handle,
//! the discovery cache, the scanner and the installer, and exposes the
//! operations hosts call.
//!
//! ```text
//! <plugins_dir>/
//! ├── installed_plugins.json
//! ├── marketplaces/
//! │   └── <marketplace>/.claude-plugin/marketplace.json
//! └── cache/
//!     └── <marketplace>/<plugin>/<version>/
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::plugin::cache::{Clock, DiscoveryCache, SystemClock};
use crate::plugin::fetcher::{GitCli, SourceControl};
use crate::plugin::installer::PluginInstaller;
use crate::plugin::marketplace::{component_paths, MarketplaceScanner};
use crate::plugin::mcp::extract_mcp_servers;
use crate::plugin::registry::InstallRegistry;
use crate::plugin::types::{
    AvailablePlugin, ComponentPaths, InstalledPluginEntry, McpServerRecord, PluginInfo,
    ScanReport,
};

const MARKETPLACES_DIR: &str = "marketplaces";
const CACHE_DIR: &str = "cache";

/// Plugin Manager - high-level API for discovery and install lifecycle
pub struct PluginManager {
    plugins_dir: PathBuf,
    registry: Arc<InstallRegistry>,
    cache: Arc<DiscoveryCache>,
    scanner: MarketplaceScanner,
    installer: PluginInstaller,
}

impl PluginManager {
    /// Production wiring: `git` from config and the system clock
    pub fn from_config(base_dir: &Path, config: &Config) -> Self {
        Self::with_parts(
            config.plugins_dir(base_dir),
            Arc::new(GitCli::from_config(&config.install)),
            Arc::new(SystemClock),
            config.cache_ttl(),
        )
    }

    pub fn with_parts(
        plugins_dir: PathBuf,
        source_control: Arc<dyn SourceControl>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
    ) -> Self {
        let registry = Arc::new(InstallRegistry::new(&plugins_dir));
        let cache = Arc::new(DiscoveryCache::new(cache_ttl, clock));
        let scanner =
            MarketplaceScanner::new(plugins_dir.join(MARKETPLACES_DIR), Arc::clone(&registry));
        let installer = PluginInstaller::new(
            plugins_dir.join(CACHE_DIR),
            Arc::clone(&registry),
            Arc::clone(&cache),
            source_control,
        );

        Self {
            plugins_dir,
            registry,
            cache,
            scanner,
            installer,
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn marketplaces_dir(&self) -> &Path {
        self.scanner.marketplaces_dir()
    }

    pub fn registry(&self) -> &InstallRegistry {
        &self.registry
    }

    /// Installed plugins, served from cache while fresh
    pub async fn discover_installed_plugins(&self) -> Arc<ScanReport<PluginInfo>> {
        if let Some(cached) = self.cache.get_plugins() {
            tracing::debug!("installed plugins served from cache");
            return cached;
        }

        let started = self.cache.generation();
        let report = self.scanner.discover_installed_plugins().await;
        self.cache.populate_plugins(started, report)
    }

    /// Remote plugins that could be installed; always scanned fresh
    pub async fn discover_available_plugins(&self) -> ScanReport<AvailablePlugin> {
        self.scanner.discover_available_plugins().await
    }

    /// MCP servers declared by installed plugins, served from cache while fresh
    pub async fn discover_plugin_mcp_servers(&self) -> Arc<Vec<McpServerRecord>> {
        if let Some(cached) = self.cache.get_mcp_servers() {
            tracing::debug!("mcp servers served from cache");
            return cached;
        }

        let started = self.cache.generation();
        let plugins = self.discover_installed_plugins().await;
        let records = extract_mcp_servers(&plugins.items).await;
        self.cache.populate_mcp_servers(started, records)
    }

    pub fn component_paths(&self, plugin: &PluginInfo) -> ComponentPaths {
        component_paths(plugin)
    }

    pub async fn install_plugin(
        &self,
        marketplace: &str,
        plugin_name: &str,
        source_url: &str,
    ) -> Result<InstalledPluginEntry> {
        self.installer
            .install(marketplace, plugin_name, source_url)
            .await
    }

    pub async fn uninstall_plugin(
        &self,
        marketplace: &str,
        plugin_name: &str,
    ) -> Result<Option<InstalledPluginEntry>> {
        self.installer.uninstall(marketplace, plugin_name).await
    }

    /// Forget cached discovery results
    pub fn clear_cache(&self) {
        self.cache.invalidate();
    }
}
