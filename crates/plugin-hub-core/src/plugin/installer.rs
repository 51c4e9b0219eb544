//! Plugin Installer
//!
//! Clones a plugin into `cache/<marketplace>/<plugin>/<version>`, records
//! it in the registry and invalidates discovery. The registry write comes
//! last: any earlier failure leaves the registry untouched.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use serde::Deserialize;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{PluginHubError, Result};
use crate::plugin::cache::DiscoveryCache;
use crate::plugin::fetcher::SourceControl;
use crate::plugin::registry::InstallRegistry;
use crate::plugin::types::{InstallScope, InstalledPluginEntry, PluginKey};

/// Version recorded when a clone declares none
pub const DEFAULT_VERSION: &str = "0.0.0";

const STAGING_DIR: &str = ".staging";
const MAX_NAME_LEN: usize = 64;

/// Manifests consulted for a version, in order
const VERSION_MANIFESTS: &[&str] = &[".claude-plugin/plugin.json", "package.json"];

#[derive(Deserialize)]
struct VersionOnly {
    #[serde(default)]
    version: Option<String>,
}

/// Plugin Installer - install/uninstall against the shared registry and cache
pub struct PluginInstaller {
    registry: Arc<InstallRegistry>,
    cache: Arc<DiscoveryCache>,
    source_control: Arc<dyn SourceControl>,
    /// Cache directory (<plugins_dir>/cache)
    cache_dir: PathBuf,
    /// One lock per plugin, held from staging until the registry is updated
    key_locks: StdMutex<HashMap<PluginKey, Arc<Mutex<()>>>>,
}

impl PluginInstaller {
    pub fn new(
        cache_dir: PathBuf,
        registry: Arc<InstallRegistry>,
        cache: Arc<DiscoveryCache>,
        source_control: Arc<dyn SourceControl>,
    ) -> Self {
        Self {
            registry,
            cache,
            source_control,
            cache_dir,
            key_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic per-plugin directory holding staging and version dirs
    pub fn plugin_cache_dir(&self, marketplace: &str, plugin_name: &str) -> PathBuf {
        self.cache_dir.join(marketplace).join(plugin_name)
    }

    /// Clone `source_url` and register it as the current install
    pub async fn install(
        &self,
        marketplace: &str,
        plugin_name: &str,
        source_url: &str,
    ) -> Result<InstalledPluginEntry> {
        validate_name(marketplace)?;
        validate_name(plugin_name)?;

        let key = PluginKey::new(plugin_name, marketplace);
        let _guard = self.lock_key(&key).await;

        let plugin_dir = self.plugin_cache_dir(marketplace, plugin_name);
        fs::create_dir_all(&plugin_dir).await?;

        let staging = plugin_dir.join(STAGING_DIR);
        remove_dir_if_exists(&staging).await?;

        tracing::info!(plugin = %key, url = source_url, "cloning plugin");
        if let Err(e) = self.source_control.clone_shallow(source_url, &staging).await {
            discard(&staging).await;
            return Err(e);
        }

        let version = detect_version(&staging).await;
        let commit_sha = self.source_control.head_commit(&staging).await;

        let install_path = plugin_dir.join(&version);
        if let Err(e) = replace_dir(&staging, &install_path).await {
            discard(&staging).await;
            return Err(e);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let entry = InstalledPluginEntry {
            scope: InstallScope::User,
            install_path,
            version,
            installed_at: now.clone(),
            last_updated: now,
            commit_sha,
        };

        let result = self.registry.append_entry(&key, entry.clone()).await;
        self.cache.invalidate();
        result?;

        tracing::info!(
            plugin = %key,
            version = %entry.version,
            path = %entry.install_path.display(),
            "plugin installed"
        );
        Ok(entry)
    }

    /// Remove the current install directory and forget the plugin
    ///
    /// Returns the entry that was current, if any. Failing to delete the
    /// directory is tolerated; failing to persist the registry is not.
    pub async fn uninstall(
        &self,
        marketplace: &str,
        plugin_name: &str,
    ) -> Result<Option<InstalledPluginEntry>> {
        validate_name(marketplace)?;
        validate_name(plugin_name)?;

        let key = PluginKey::new(plugin_name, marketplace);
        let _guard = self.lock_key(&key).await;

        let current = self.registry.latest(&key).await;

        if let Some(entry) = &current {
            match fs::remove_dir_all(&entry.install_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    plugin = %key,
                    path = %entry.install_path.display(),
                    "failed to remove plugin directory: {}",
                    e
                ),
            }
        }

        let result = self.registry.remove_key(&key).await;
        self.cache.invalidate();
        result?;

        tracing::info!(plugin = %key, "plugin uninstalled");
        Ok(current)
    }

    /// Serialize install and uninstall of the same plugin
    async fn lock_key(&self, key: &PluginKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .key_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Reject names that could escape the cache directory
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(PluginHubError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.trim().is_empty() {
        return invalid("cannot be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("cannot exceed 64 characters");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return invalid("contains invalid path characters");
    }
    if name.starts_with('.') {
        return invalid("cannot start with '.'");
    }

    Ok(())
}

/// Version declared inside a fresh clone, or [`DEFAULT_VERSION`]
pub async fn detect_version(repo: &Path) -> String {
    for manifest in VERSION_MANIFESTS {
        let Ok(content) = fs::read_to_string(repo.join(manifest)).await else {
            continue;
        };
        let declared = serde_json::from_str::<VersionOnly>(&content)
            .ok()
            .and_then(|m| m.version);

        if let Some(version) = declared {
            let version = version.trim();
            if validate_name(version).is_ok() {
                return version.to_string();
            }
            tracing::warn!(manifest, version, "ignoring unusable version string");
        }
    }

    DEFAULT_VERSION.to_string()
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Move `staging` to `target`, replacing whatever was there
async fn replace_dir(staging: &Path, target: &Path) -> Result<()> {
    remove_dir_if_exists(target).await?;
    fs::rename(staging, target).await?;
    Ok(())
}

async fn discard(staging: &Path) {
    if let Err(e) = remove_dir_if_exists(staging).await {
        tracing::warn!(path = %staging.display(), "failed to clean staging directory: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::cache::ManualClock;
    use crate::plugin::fetcher::FakeSourceControl;
    use crate::plugin::types::ScanReport;
    use std::fs as stdfs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        installer: PluginInstaller,
        registry: Arc<InstallRegistry>,
        cache: Arc<DiscoveryCache>,
    }

    fn create_test_installer(source_control: impl SourceControl + 'static) -> Fixture {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(InstallRegistry::new(temp.path()));
        let cache = Arc::new(DiscoveryCache::new(
            Duration::from_secs(30),
            Arc::new(ManualClock::new()),
        ));
        let installer = PluginInstaller::new(
            temp.path().join("cache"),
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::new(source_control),
        );
        Fixture {
            _temp: temp,
            installer,
            registry,
            cache,
        }
    }

    #[tokio::test]
    async fn test_install_places_clone_under_version_dir() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.2.3"));

        let entry = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();

        let expected = fx.installer.cache_dir().join("acme/bar/1.2.3");
        assert_eq!(entry.install_path, expected);
        assert_eq!(entry.version, "1.2.3");
        assert_eq!(entry.scope, InstallScope::User);
        assert_eq!(entry.commit_sha.as_deref(), Some("0123456789abcdef"));
        assert!(expected.join("commands").is_dir());
        assert!(!fx.installer.plugin_cache_dir("acme", "bar").join(STAGING_DIR).exists());

        let key = PluginKey::new("bar", "acme");
        assert_eq!(fx.registry.latest(&key).await, Some(entry));
    }

    #[tokio::test]
    async fn test_install_without_version_uses_default() {
        let mut fake = FakeSourceControl::with_version("unused");
        fake.version = None;
        fake.commit = None;
        let fx = create_test_installer(fake);

        let entry = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();
        assert_eq!(entry.version, DEFAULT_VERSION);
        assert!(entry.commit_sha.is_none());
    }

    #[tokio::test]
    async fn test_clone_failure_leaves_registry_untouched() {
        let fx = create_test_installer(FakeSourceControl::failing("repository not found"));

        let err = fx
            .installer
            .install("acme", "bar", "https://example/missing.git")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("repository not found"));
        assert!(fx.registry.read().await.plugins.is_empty());
        assert!(!fx.registry.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clone_timeout_cleans_staging_and_skips_registry() {
        use crate::plugin::fetcher::GitCli;
        use std::os::unix::fs::PermissionsExt;

        let bin = TempDir::new().unwrap();
        let script = bin.path().join("slow-git");
        // Invoked as: clone --depth 1 -- <url> <target>
        stdfs::write(&script, "#!/bin/sh\nmkdir -p \"$6\"\nexec sleep 10\n").unwrap();
        stdfs::set_permissions(&script, stdfs::Permissions::from_mode(0o755)).unwrap();

        let git = GitCli::new(script.display().to_string(), Duration::from_secs(1));
        let fx = create_test_installer(git);

        let err = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap_err();

        assert!(matches!(err, PluginHubError::CloneTimeout { seconds: 1 }));
        let plugin_dir = fx.installer.plugin_cache_dir("acme", "bar");
        assert!(!plugin_dir.join(STAGING_DIR).exists());
        assert!(!plugin_dir.join(DEFAULT_VERSION).exists());
        assert!(!fx.registry.path().exists());
    }

    #[tokio::test]
    async fn test_stale_staging_is_replaced() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.0.0"));
        let staging = fx.installer.plugin_cache_dir("acme", "bar").join(STAGING_DIR);
        stdfs::create_dir_all(&staging).unwrap();
        stdfs::write(staging.join("leftover"), "x").unwrap();

        let entry = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();

        assert!(!entry.install_path.join("leftover").exists());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_reinstall_same_version_overwrites_dir_and_appends_history() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.0.0"));

        let first = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();
        stdfs::write(first.install_path.join("marker"), "old").unwrap();

        let second = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();

        assert_eq!(first.install_path, second.install_path);
        assert!(!second.install_path.join("marker").exists());
        assert_eq!(fx.registry.read().await.plugins["bar@acme"].len(), 2);
    }

    #[tokio::test]
    async fn test_install_and_uninstall_invalidate_cache() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.0.0"));

        fx.cache
            .populate_plugins(fx.cache.generation(), ScanReport::default());
        fx.installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();
        assert!(fx.cache.get_plugins().is_none());

        fx.cache
            .populate_plugins(fx.cache.generation(), ScanReport::default());
        fx.installer.uninstall("acme", "bar").await.unwrap();
        assert!(fx.cache.get_plugins().is_none());
    }

    #[tokio::test]
    async fn test_uninstall_removes_directory_and_key() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.0.0"));
        let entry = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();

        let removed = fx.installer.uninstall("acme", "bar").await.unwrap();

        assert_eq!(removed, Some(entry.clone()));
        assert!(!entry.install_path.exists());
        assert!(!fx.registry.contains(&PluginKey::new("bar", "acme")).await);
    }

    #[tokio::test]
    async fn test_uninstall_tolerates_missing_directory() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.0.0"));
        let entry = fx
            .installer
            .install("acme", "bar", "https://example/bar.git")
            .await
            .unwrap();
        stdfs::remove_dir_all(&entry.install_path).unwrap();

        assert!(fx.installer.uninstall("acme", "bar").await.is_ok());
        assert!(fx.installer.uninstall("acme", "never").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_install_rejects_path_like_names() {
        let fx = create_test_installer(FakeSourceControl::with_version("1.0.0"));

        for (marketplace, plugin) in [("acme", "../etc"), ("a/b", "bar"), ("acme", "")] {
            let result = fx
                .installer
                .install(marketplace, plugin, "https://example/bar.git")
                .await;
            assert!(matches!(result, Err(PluginHubError::InvalidName { .. })));

            let result = fx.installer.uninstall(marketplace, plugin).await;
            assert!(matches!(result, Err(PluginHubError::InvalidName { .. })));
        }
        assert!(!fx.registry.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_installs_of_same_plugin_keep_complete_dir() {
        let fx = create_test_installer(FakeSourceControl::slow(
            "1.0.0",
            Duration::from_millis(50),
        ));

        let first = fx.installer.install("acme", "bar", "https://example/bar.git");
        let second = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fx.installer
                .install("acme", "bar", "https://example/bar.git")
                .await
        };
        let (first, second) = tokio::join!(first, second);
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.install_path, second.install_path);
        let path = &second.install_path;
        assert!(path.join("commands").is_dir());
        assert!(path.join("ORIGIN").is_file());
        assert!(path.join(".claude-plugin/plugin.json").is_file());
        assert!(!fx.installer.plugin_cache_dir("acme", "bar").join(STAGING_DIR).exists());
        assert_eq!(fx.registry.read().await.plugins["bar@acme"].len(), 2);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("claude-plugins-official").is_ok());
        assert!(validate_name("my_plugin.v2").is_ok());
        assert!(validate_name("1.0.0").is_ok());
        assert!(validate_name(&"a".repeat(65)).is_err());
        assert!(validate_name("foo\\bar").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".staging").is_err());
        assert!(validate_name("   ").is_err());
    }

    #[tokio::test]
    async fn test_detect_version_fallbacks() {
        let temp = TempDir::new().unwrap();
        assert_eq!(detect_version(temp.path()).await, DEFAULT_VERSION);

        stdfs::write(temp.path().join("package.json"), r#"{"version": "3.1.0"}"#).unwrap();
        assert_eq!(detect_version(temp.path()).await, "3.1.0");

        stdfs::create_dir_all(temp.path().join(".claude-plugin")).unwrap();
        stdfs::write(
            temp.path().join(".claude-plugin/plugin.json"),
            r#"{"name": "x", "version": "../../escape"}"#,
        )
        .unwrap();
        assert_eq!(detect_version(temp.path()).await, "3.1.0");

        stdfs::write(
            temp.path().join(".claude-plugin/plugin.json"),
            r#"{"name": "x", "version": "2.0.0"}"#,
        )
        .unwrap();
        assert_eq!(detect_version(temp.path()).await, "2.0.0");
    }
}
