//! Plugin Module
//!
//! Marketplace-distributed plugin discovery and install lifecycle.
//!
//! - `types`: manifest, registry and result types
//! - `registry`: `installed_plugins.json` persistence
//! - `resolver`: effective plugin directory (registry first, then local source)
//! - `marketplace`: marketplace scanning
//! - `mcp`: MCP server descriptors shipped by plugins
//! - `cache`: TTL cache over discovery results
//! - `fetcher`: source-control client (git)
//! - `installer`: install / uninstall
//! - `manager`: façade wiring everything together

pub mod cache;
pub mod fetcher;
pub mod installer;
pub mod manager;
pub mod marketplace;
pub mod mcp;
pub mod registry;
pub mod resolver;
pub mod types;

// Re-exports
pub use cache::{Clock, DiscoveryCache, SystemClock};
pub use fetcher::{GitCli, SourceControl};
pub use installer::PluginInstaller;
pub use manager::PluginManager;
pub use marketplace::{component_paths, MarketplaceScanner};
pub use registry::InstallRegistry;
pub use resolver::{PathResolver, Resolution};
pub use types::{
    AvailablePlugin, ComponentPaths, Diagnostic, DiagnosticKind, InstallRegistryDocument,
    InstallScope, InstalledPluginEntry, McpServerRecord, PluginInfo, PluginKey,
    PluginManifestEntry, PluginSource, ScanReport,
};
