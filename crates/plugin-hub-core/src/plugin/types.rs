//! Plugin type definitions
//!
//! Types for marketplace manifests, the install registry document and the
//! resolved views handed back to callers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Current schema tag written into `installed_plugins.json`
pub const REGISTRY_SCHEMA_VERSION: u32 = 2;

/// Marketplace manifest (parsed from `.claude-plugin/marketplace.json`)
///
/// Plugin entries are kept as raw JSON so that one malformed entry can be
/// reported on its own instead of failing the whole manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceManifest {
    /// Declared marketplace name
    #[serde(default)]
    pub name: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Raw plugin entries
    #[serde(default, deserialize_with = "null_as_default")]
    pub plugins: Vec<serde_json::Value>,
}

impl MarketplaceManifest {
    /// Decode each plugin entry independently
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = (usize, Result<PluginManifestEntry, serde_json::Error>)> + '_ {
        self.plugins
            .iter()
            .enumerate()
            .map(|(index, raw)| (index, PluginManifestEntry::deserialize(raw)))
    }
}

/// A marketplace directory and its parsed manifest
#[derive(Debug, Clone)]
pub struct Marketplace {
    /// Directory name; used in registry keys and source identifiers
    pub name: String,
    /// Marketplace root directory
    pub root: PathBuf,
    pub manifest: MarketplaceManifest,
}

/// Plugin entry in marketplace.json
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifestEntry {
    /// Plugin name (unique identifier within marketplace)
    pub name: String,
    /// Source location; `None` when absent or empty
    #[serde(default, deserialize_with = "deserialize_source")]
    pub source: Option<PluginSource>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

/// Where a plugin comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PluginSource {
    /// Directory relative to the marketplace root (e.g. "./plugins/foo")
    LocalPath(String),
    /// Repository to clone
    RemoteUrl(String),
}

/// Wire shape of `source`: a bare path or a structured object
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Path(String),
    Structured {
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        repo: Option<String>,
    },
}

impl RawSource {
    fn into_source(self) -> Option<PluginSource> {
        match self {
            Self::Path(path) => {
                let path = path.trim();
                (!path.is_empty()).then(|| PluginSource::LocalPath(path.to_string()))
            }
            Self::Structured { source, url, repo } => {
                if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
                    return Some(PluginSource::RemoteUrl(url.trim().to_string()));
                }
                match (source.as_deref(), repo) {
                    (Some("github") | None, Some(repo)) if !repo.trim().is_empty() => Some(
                        PluginSource::RemoteUrl(format!("https://github.com/{}.git", repo.trim())),
                    ),
                    _ => None,
                }
            }
        }
    }
}

fn deserialize_source<'de, D>(deserializer: D) -> Result<Option<PluginSource>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawSource>::deserialize(deserializer)?;
    Ok(raw.and_then(RawSource::into_source))
}

/// Treats an explicit `null` like an absent key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Installation scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallScope {
    #[default]
    User,
    Project,
    Local,
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Project => write!(f, "project"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Composite registry key, rendered as `name@marketplace`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    pub name: String,
    pub marketplace: String,
}

impl PluginKey {
    pub fn new(name: impl Into<String>, marketplace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            marketplace: marketplace.into(),
        }
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.marketplace)
    }
}

/// One install of a plugin (element of a registry history)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPluginEntry {
    pub scope: InstallScope,
    pub install_path: PathBuf,
    pub version: String,
    pub installed_at: String,
    pub last_updated: String,
    #[serde(default, alias = "gitCommitSha", skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

/// `installed_plugins.json` structure
///
/// Each key maps to an append-only history; the last element is the
/// current install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallRegistryDocument {
    pub version: u32,
    #[serde(default)]
    pub plugins: BTreeMap<String, Vec<InstalledPluginEntry>>,
}

impl Default for InstallRegistryDocument {
    fn default() -> Self {
        Self {
            version: REGISTRY_SCHEMA_VERSION,
            plugins: BTreeMap::new(),
        }
    }
}

impl InstallRegistryDocument {
    /// Current install for `key`
    pub fn latest(&self, key: &PluginKey) -> Option<&InstalledPluginEntry> {
        self.plugins.get(&key.to_string()).and_then(|v| v.last())
    }

    pub fn contains(&self, key: &PluginKey) -> bool {
        self.plugins.contains_key(&key.to_string())
    }
}

/// Installed plugin with a verified on-disk directory
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    /// Resolved plugin directory (exists at resolution time)
    pub path: PathBuf,
    /// `<marketplace>:<name>`
    pub source: String,
    pub marketplace: String,
    pub category: Option<String>,
    pub homepage: Option<String>,
    pub tags: Vec<String>,
}

impl PluginInfo {
    pub fn key(&self) -> PluginKey {
        PluginKey::new(&self.name, &self.marketplace)
    }
}

/// Remote plugin declared by a marketplace but not installed yet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailablePlugin {
    pub name: String,
    pub description: Option<String>,
    pub marketplace: String,
    pub source_url: String,
    pub category: Option<String>,
    pub homepage: Option<String>,
    pub tags: Vec<String>,
}

/// Validated MCP server map contributed by one plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpServerRecord {
    /// Plugin source identifier (`<marketplace>:<name>`)
    pub source: String,
    pub servers: serde_json::Map<String, serde_json::Value>,
}

/// Component directories inside a plugin (not checked for existence)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentPaths {
    pub commands: PathBuf,
    pub skills: PathBuf,
    pub agents: PathBuf,
}

/// Why a marketplace or entry was skipped during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingManifest,
    ParseError,
    MissingSource,
    Unresolved,
    Io,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingManifest => "missing manifest",
            Self::ParseError => "parse error",
            Self::MissingSource => "missing source",
            Self::Unresolved => "unresolved",
            Self::Io => "io error",
        };
        f.write_str(label)
    }
}

/// Non-fatal issue collected while scanning
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub marketplace: String,
    pub plugin: Option<String>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plugin {
            Some(plugin) => write!(
                f,
                "{}@{}: {}: {}",
                plugin, self.marketplace, self.kind, self.message
            ),
            None => write!(f, "{}: {}: {}", self.marketplace, self.kind, self.message),
        }
    }
}

/// Scan output: everything that resolved, plus what was skipped and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport<T> {
    pub items: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for ScanReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}
