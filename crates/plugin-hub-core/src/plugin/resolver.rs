//! Plugin path resolution
//!
//! Decides which directory a manifest entry lives in. The registry wins
//! once it has a usable entry because it records the real clone target;
//! local sources fall back to a path relative to the marketplace root.

use std::path::{Component, Path, PathBuf};

use crate::plugin::types::{InstallRegistryDocument, PluginKey, PluginManifestEntry, PluginSource};

/// Outcome of resolving one manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Current registry install path
    Registry(PathBuf),
    /// Local source relative to the marketplace root
    Local(PathBuf),
    /// Nothing usable on disk
    Unresolved,
}

impl Resolution {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Registry(path) | Self::Local(path) => Some(path),
            Self::Unresolved => None,
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Self::Registry(path) | Self::Local(path) => Some(path),
            Self::Unresolved => None,
        }
    }
}

/// Resolves entries against one registry snapshot
pub struct PathResolver<'a> {
    registry: &'a InstallRegistryDocument,
}

impl<'a> PathResolver<'a> {
    pub fn new(registry: &'a InstallRegistryDocument) -> Self {
        Self { registry }
    }

    pub async fn resolve(
        &self,
        marketplace: &str,
        marketplace_root: &Path,
        entry: &PluginManifestEntry,
    ) -> Resolution {
        let key = PluginKey::new(&entry.name, marketplace);

        if let Some(installed) = self.registry.latest(&key) {
            if is_dir(&installed.install_path).await {
                return Resolution::Registry(installed.install_path.clone());
            }
            tracing::debug!(
                plugin = %key,
                path = %installed.install_path.display(),
                "registry path missing, falling back to manifest source"
            );
        }

        match &entry.source {
            Some(PluginSource::LocalPath(relative)) => {
                let Some(candidate) = local_source_dir(marketplace_root, relative) else {
                    tracing::debug!(plugin = %key, source = %relative, "local source escapes marketplace root");
                    return Resolution::Unresolved;
                };
                if is_dir(&candidate).await {
                    Resolution::Local(candidate)
                } else {
                    Resolution::Unresolved
                }
            }
            Some(PluginSource::RemoteUrl(_)) | None => Resolution::Unresolved,
        }
    }
}

/// `./plugins/foo` under `root` becomes `root/plugins/foo`
///
/// Absolute paths and `..` components are refused so a manifest can only
/// point inside its own marketplace.
pub fn local_source_dir(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim_start_matches("./"));
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    contained.then(|| root.join(relative))
}

/// Failed metadata lookups count as "not a directory"
pub(crate) async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
