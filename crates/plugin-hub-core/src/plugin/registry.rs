//! Install Registry
//!
//! Manages `installed_plugins.json`: the persistent record of every
//! plugin's current and historical install locations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::plugin::types::{InstallRegistryDocument, InstalledPluginEntry, PluginKey};

pub const INSTALLED_PLUGINS_FILE: &str = "installed_plugins.json";

/// Install Registry - whole-document JSON store
///
/// Mutations run as read-modify-write cycles serialized by an async mutex,
/// so concurrent installs in one process cannot drop each other's updates.
pub struct InstallRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl InstallRegistry {
    /// Registry stored in `<plugins_dir>/installed_plugins.json`
    pub fn new(plugins_dir: &Path) -> Self {
        Self::with_path(plugins_dir.join(INSTALLED_PLUGINS_FILE))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document; a missing or unreadable file yields an empty one
    pub async fn read(&self) -> InstallRegistryDocument {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return InstallRegistryDocument::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to read install registry: {}", e);
                return InstallRegistryDocument::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to parse install registry: {}", e);
                InstallRegistryDocument::default()
            }
        }
    }

    /// Overwrite the document in full
    pub async fn write(&self, doc: &InstallRegistryDocument) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(doc).await
    }

    /// Write a sibling file and rename it over the registry, so readers
    /// never observe a partially written document
    async fn persist(&self, doc: &InstallRegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(doc)?;
        let staged = self.staged_path();
        fs::write(&staged, content).await?;
        if let Err(e) = fs::rename(&staged, &self.path).await {
            fs::remove_file(&staged).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    fn staged_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Push `entry` onto the history for `key` and persist
    pub async fn append_entry(&self, key: &PluginKey, entry: InstalledPluginEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.read().await;
        doc.plugins.entry(key.to_string()).or_default().push(entry);
        self.persist(&doc).await?;

        tracing::debug!(plugin = %key, "registry entry appended");
        Ok(())
    }

    /// Delete the whole history for `key` and persist; returns what was removed
    pub async fn remove_key(&self, key: &PluginKey) -> Result<Option<Vec<InstalledPluginEntry>>> {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.read().await;
        let removed = doc.plugins.remove(&key.to_string());
        self.persist(&doc).await?;

        tracing::debug!(plugin = %key, existed = removed.is_some(), "registry key removed");
        Ok(removed)
    }

    /// Current install for `key`
    pub async fn latest(&self, key: &PluginKey) -> Option<InstalledPluginEntry> {
        self.read().await.latest(key).cloned()
    }

    /// Install path of the current install for `key`
    pub async fn latest_path(&self, key: &PluginKey) -> Option<PathBuf> {
        self.latest(key).await.map(|entry| entry.install_path)
    }

    pub async fn contains(&self, key: &PluginKey) -> bool {
        self.read().await.contains(key)
    }

    /// Every key with its current install
    pub async fn installed_plugins(&self) -> Vec<(String, InstalledPluginEntry)> {
        self.read()
            .await
            .plugins
            .into_iter()
            .filter_map(|(key, mut history)| history.pop().map(|entry| (key, entry)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::types::InstallScope;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_registry() -> (InstallRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = InstallRegistry::new(temp_dir.path());
        (registry, temp_dir)
    }

    fn entry(path: &str, version: &str) -> InstalledPluginEntry {
        InstalledPluginEntry {
            scope: InstallScope::User,
            install_path: PathBuf::from(path),
            version: version.to_string(),
            installed_at: "2025-01-01T00:00:00Z".to_string(),
            last_updated: "2025-01-01T00:00:00Z".to_string(),
            commit_sha: None,
        }
    }

    #[tokio::test]
    async fn test_read_missing_file_is_empty() {
        let (registry, _temp) = create_test_registry();

        let doc = registry.read().await;
        assert_eq!(doc.version, 2);
        assert!(doc.plugins.is_empty());
    }

    #[tokio::test]
    async fn test_read_corrupt_file_is_empty() {
        let (registry, _temp) = create_test_registry();
        std::fs::write(registry.path(), "{ not json").unwrap();

        let doc = registry.read().await;
        assert_eq!(doc, InstallRegistryDocument::default());
    }

    #[tokio::test]
    async fn test_write_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let registry = InstallRegistry::new(&temp.path().join("nested/plugins"));

        registry
            .write(&InstallRegistryDocument::default())
            .await
            .unwrap();
        assert!(registry.path().exists());
    }

    #[tokio::test]
    async fn test_write_replaces_file_without_leaving_staged_copy() {
        let (registry, _temp) = create_test_registry();
        let key = PluginKey::new("plugin", "market");
        std::fs::write(registry.staged_path(), "{ torn").unwrap();

        registry.append_entry(&key, entry("/a", "1.0.0")).await.unwrap();
        registry.append_entry(&key, entry("/b", "1.1.0")).await.unwrap();

        assert!(!registry.staged_path().exists());
        let on_disk: InstallRegistryDocument =
            serde_json::from_str(&std::fs::read_to_string(registry.path()).unwrap()).unwrap();
        assert_eq!(on_disk.plugins["plugin@market"].len(), 2);
    }

    #[tokio::test]
    async fn test_append_keeps_history_and_latest_wins() {
        let (registry, _temp) = create_test_registry();
        let key = PluginKey::new("plugin", "market");

        registry.append_entry(&key, entry("/a", "1.0.0")).await.unwrap();
        registry.append_entry(&key, entry("/b", "1.1.0")).await.unwrap();

        let doc = registry.read().await;
        assert_eq!(doc.plugins["plugin@market"].len(), 2);
        assert_eq!(registry.latest_path(&key).await, Some(PathBuf::from("/b")));
        assert_eq!(registry.latest(&key).await.unwrap().version, "1.1.0");
    }

    #[tokio::test]
    async fn test_remove_key_drops_whole_history() {
        let (registry, _temp) = create_test_registry();
        let key = PluginKey::new("plugin", "market");
        let other = PluginKey::new("other", "market");

        registry.append_entry(&key, entry("/a", "1.0.0")).await.unwrap();
        registry.append_entry(&key, entry("/b", "1.1.0")).await.unwrap();
        registry.append_entry(&other, entry("/c", "2.0.0")).await.unwrap();

        let removed = registry.remove_key(&key).await.unwrap();
        assert_eq!(removed.map(|h| h.len()), Some(2));
        assert!(!registry.contains(&key).await);
        assert!(registry.contains(&other).await);
        assert!(registry.latest_path(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_ok() {
        let (registry, _temp) = create_test_registry();
        let removed = registry
            .remove_key(&PluginKey::new("ghost", "market"))
            .await
            .unwrap();
        assert!(removed.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let (registry, _temp) = create_test_registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let key = PluginKey::new(format!("plugin-{i}"), "market");
                    registry
                        .append_entry(&key, entry(&format!("/p/{i}"), "1.0.0"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.installed_plugins().await.len(), 8);
    }
}
