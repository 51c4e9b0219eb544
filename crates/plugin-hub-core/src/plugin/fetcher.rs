//! Plugin Fetcher
//!
//! Source-control operations used by the installer: shallow clone and
//! revision lookup.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{InstallConfig, DEFAULT_CLONE_TIMEOUT_SECS};
use crate::error::{PluginHubError, Result};

/// Source-control client
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Depth-1 clone of `url` into `target` (which must not exist)
    async fn clone_shallow(&self, url: &str, target: &Path) -> Result<()>;

    /// Commit hash checked out in `repo`, if it can be determined
    async fn head_commit(&self, repo: &Path) -> Option<String>;
}

/// `git` executable driven through `tokio::process`
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    clone_timeout: Duration,
}

impl GitCli {
    pub fn new(program: impl Into<String>, clone_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            clone_timeout,
        }
    }

    pub fn from_config(config: &InstallConfig) -> Self {
        Self::new(config.git_program.clone(), config.clone_timeout())
    }

    pub fn clone_timeout(&self) -> Duration {
        self.clone_timeout
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git", Duration::from_secs(DEFAULT_CLONE_TIMEOUT_SECS))
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_shallow(&self, url: &str, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(["clone", "--depth", "1", "--"])
            .arg(url)
            .arg(target)
            .stdin(Stdio::null())
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        tracing::debug!(url, target = %target.display(), "running git clone");

        let output = match tokio::time::timeout(self.clone_timeout, cmd.output()).await {
            Ok(output) => output.map_err(|e| {
                PluginHubError::Git(format!("failed to run {}: {}", self.program, e))
            })?,
            Err(_) => {
                return Err(PluginHubError::CloneTimeout {
                    seconds: self.clone_timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginHubError::Git(format!(
                "git clone failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }

    async fn head_commit(&self, repo: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .args(["rev-parse", "HEAD"])
            .current_dir(repo)
            .stdin(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!sha.is_empty()).then_some(sha)
    }
}

/// In-memory stand-in for git: "clones" by writing a plugin skeleton
#[cfg(test)]
pub(crate) struct FakeSourceControl {
    pub(crate) version: Option<String>,
    pub(crate) commit: Option<String>,
    pub(crate) fail_with: Option<String>,
    /// Pause between written files, to widen the window a clone is in progress
    pub(crate) delay: Option<Duration>,
}

#[cfg(test)]
impl FakeSourceControl {
    pub(crate) fn with_version(version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            commit: Some("0123456789abcdef".to_string()),
            fail_with: None,
            delay: None,
        }
    }

    pub(crate) fn slow(version: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::with_version(version)
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            version: None,
            commit: None,
            fail_with: Some(message.to_string()),
            delay: None,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn clone_shallow(&self, url: &str, target: &Path) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(PluginHubError::Git(message.clone()));
        }

        tokio::fs::create_dir_all(target.join(".claude-plugin")).await?;
        tokio::fs::create_dir_all(target.join("commands")).await?;
        self.pause().await;
        tokio::fs::write(target.join("ORIGIN"), url).await?;
        self.pause().await;
        if let Some(version) = &self.version {
            let manifest = serde_json::json!({ "name": "fake", "version": version });
            tokio::fs::write(
                target.join(".claude-plugin/plugin.json"),
                manifest.to_string(),
            )
            .await?;
        }
        Ok(())
    }

    async fn head_commit(&self, _repo: &Path) -> Option<String> {
        self.commit.clone()
    }
}
