//! Marketplace Scanner
//!
//! Walks `<plugins_dir>/marketplaces/*`, parses each
//! `.claude-plugin/marketplace.json` and turns manifest entries into
//! installed or available plugins. Failures are per unit: a broken
//! marketplace or entry becomes a [`Diagnostic`] and the scan continues.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::plugin::registry::InstallRegistry;
use crate::plugin::resolver::{is_dir, PathResolver};
use crate::plugin::types::{
    AvailablePlugin, ComponentPaths, Diagnostic, DiagnosticKind, Marketplace, MarketplaceManifest,
    PluginInfo, PluginKey, PluginManifestEntry, PluginSource, ScanReport,
};

pub const MARKETPLACE_FILE: &str = ".claude-plugin/marketplace.json";

/// Parse a marketplace manifest from a string
pub fn parse_marketplace_str(content: &str) -> serde_json::Result<MarketplaceManifest> {
    serde_json::from_str(content)
}

/// `commands`, `skills` and `agents` under the plugin directory
pub fn component_paths(plugin: &PluginInfo) -> ComponentPaths {
    ComponentPaths {
        commands: plugin.path.join("commands"),
        skills: plugin.path.join("skills"),
        agents: plugin.path.join("agents"),
    }
}

/// Marketplace Scanner - reads marketplaces and resolves their plugins
pub struct MarketplaceScanner {
    /// Marketplaces directory (<plugins_dir>/marketplaces)
    marketplaces_dir: PathBuf,
    registry: Arc<InstallRegistry>,
}

impl MarketplaceScanner {
    pub fn new(marketplaces_dir: PathBuf, registry: Arc<InstallRegistry>) -> Self {
        Self {
            marketplaces_dir,
            registry,
        }
    }

    pub fn marketplaces_dir(&self) -> &Path {
        &self.marketplaces_dir
    }

    /// Plugins whose directory resolves on disk
    pub async fn discover_installed_plugins(&self) -> ScanReport<PluginInfo> {
        let mut report = ScanReport::default();
        let marketplaces = self.load_marketplaces(&mut report.diagnostics).await;
        let registry = self.registry.read().await;
        let resolver = PathResolver::new(&registry);

        for marketplace in &marketplaces {
            for entry in decode_entries(marketplace, &mut report.diagnostics) {
                if entry.source.is_none() {
                    push_diagnostic(
                        &mut report.diagnostics,
                        marketplace,
                        Some(&entry.name),
                        DiagnosticKind::MissingSource,
                        "entry has no source".to_string(),
                    );
                    continue;
                }

                let resolution = resolver
                    .resolve(&marketplace.name, &marketplace.root, &entry)
                    .await;
                let Some(path) = resolution.into_path() else {
                    if matches!(entry.source, Some(PluginSource::LocalPath(_))) {
                        push_diagnostic(
                            &mut report.diagnostics,
                            marketplace,
                            Some(&entry.name),
                            DiagnosticKind::Unresolved,
                            "local source directory does not exist inside the marketplace".to_string(),
                        );
                    } else {
                        tracing::debug!(
                            marketplace = %marketplace.name,
                            plugin = %entry.name,
                            "remote plugin not installed"
                        );
                    }
                    continue;
                };

                report.items.push(PluginInfo {
                    source: format!("{}:{}", marketplace.name, entry.name),
                    marketplace: marketplace.name.clone(),
                    path,
                    name: entry.name,
                    version: entry.version,
                    description: entry.description,
                    category: entry.category,
                    homepage: entry.homepage,
                    tags: entry.tags,
                });
            }
        }

        tracing::debug!(
            plugins = report.items.len(),
            skipped = report.diagnostics.len(),
            "installed plugin scan finished"
        );
        report
    }

    /// Remote plugins not yet present in the registry
    pub async fn discover_available_plugins(&self) -> ScanReport<AvailablePlugin> {
        let mut report = ScanReport::default();
        let marketplaces = self.load_marketplaces(&mut report.diagnostics).await;
        let registry = self.registry.read().await;

        for marketplace in &marketplaces {
            for entry in decode_entries(marketplace, &mut report.diagnostics) {
                let source_url = match &entry.source {
                    Some(PluginSource::RemoteUrl(url)) => url.clone(),
                    Some(PluginSource::LocalPath(_)) => continue,
                    None => {
                        push_diagnostic(
                            &mut report.diagnostics,
                            marketplace,
                            Some(&entry.name),
                            DiagnosticKind::MissingSource,
                            "entry has no source".to_string(),
                        );
                        continue;
                    }
                };

                if registry.contains(&PluginKey::new(&entry.name, &marketplace.name)) {
                    continue;
                }

                report.items.push(AvailablePlugin {
                    name: entry.name,
                    description: entry.description,
                    marketplace: marketplace.name.clone(),
                    source_url,
                    category: entry.category,
                    homepage: entry.homepage,
                    tags: entry.tags,
                });
            }
        }

        report
    }

    /// Read every marketplace directory that has a parseable manifest
    pub async fn load_marketplaces(&self, diagnostics: &mut Vec<Diagnostic>) -> Vec<Marketplace> {
        let mut dir = match fs::read_dir(&self.marketplaces_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(
                    path = %self.marketplaces_dir.display(),
                    "failed to list marketplaces: {}",
                    e
                );
                return Vec::new();
            }
        };

        let mut roots = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.starts_with('.') {
                        continue;
                    }
                    // Follows symlinks so linked local marketplaces count
                    let path = entry.path();
                    if is_dir(&path).await {
                        roots.push((name, path));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        path = %self.marketplaces_dir.display(),
                        "failed to read marketplace entry: {}",
                        e
                    );
                    break;
                }
            }
        }
        roots.sort();

        let mut marketplaces = Vec::with_capacity(roots.len());
        for (name, root) in roots {
            match read_manifest(&root).await {
                Ok(manifest) => marketplaces.push(Marketplace {
                    name,
                    root,
                    manifest,
                }),
                Err((kind, message)) => {
                    tracing::warn!(marketplace = %name, "skipping marketplace: {}", message);
                    diagnostics.push(Diagnostic {
                        marketplace: name,
                        plugin: None,
                        kind,
                        message,
                    });
                }
            }
        }

        marketplaces
    }
}

async fn read_manifest(root: &Path) -> Result<MarketplaceManifest, (DiagnosticKind, String)> {
    let path = root.join(MARKETPLACE_FILE);

    let content = fs::read_to_string(&path).await.map_err(|e| {
        let kind = if e.kind() == ErrorKind::NotFound {
            DiagnosticKind::MissingManifest
        } else {
            DiagnosticKind::Io
        };
        (kind, format!("{}: {}", path.display(), e))
    })?;

    parse_marketplace_str(&content)
        .map_err(|e| (DiagnosticKind::ParseError, format!("{}: {}", path.display(), e)))
}

/// Decode entries one by one, recording the ones that fail
fn decode_entries(
    marketplace: &Marketplace,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<PluginManifestEntry> {
    let mut entries = Vec::new();

    for (index, decoded) in marketplace.manifest.entries() {
        match decoded {
            Ok(entry) if entry.name.trim().is_empty() => push_diagnostic(
                diagnostics,
                marketplace,
                None,
                DiagnosticKind::ParseError,
                format!("plugins[{}] has an empty name", index),
            ),
            Ok(entry) => entries.push(entry),
            Err(e) => push_diagnostic(
                diagnostics,
                marketplace,
                None,
                DiagnosticKind::ParseError,
                format!("plugins[{}]: {}", index, e),
            ),
        }
    }

    entries
}

fn push_diagnostic(
    diagnostics: &mut Vec<Diagnostic>,
    marketplace: &Marketplace,
    plugin: Option<&str>,
    kind: DiagnosticKind,
    message: String,
) {
    tracing::warn!(
        marketplace = %marketplace.name,
        plugin = plugin.unwrap_or("-"),
        "skipping plugin entry ({}): {}",
        kind,
        message
    );
    diagnostics.push(Diagnostic {
        marketplace: marketplace.name.clone(),
        plugin: plugin.map(str::to_string),
        kind,
        message,
    });
}
