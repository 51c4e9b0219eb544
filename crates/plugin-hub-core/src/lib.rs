pub mod config;
pub mod error;
pub mod plugin;

pub use config::Config;
pub use error::{PluginHubError, Result};
pub use plugin::{
    component_paths, AvailablePlugin, Clock, ComponentPaths, Diagnostic, DiagnosticKind,
    DiscoveryCache, GitCli, InstallRegistry, InstallRegistryDocument, InstallScope,
    InstalledPluginEntry, McpServerRecord, PluginInfo, PluginKey, PluginManager, PluginSource,
    ScanReport, SourceControl, SystemClock,
};
