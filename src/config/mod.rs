//! Configuration management.
//!
//! A workspace is a directory containing `.braid/`. Settings live in
//! `.braid/config.yaml`; environment variables override the file, and the
//! file overrides anything recorded in the store's own config table.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};

pub const BRAID_DIR: &str = ".braid";
pub const ISSUES_FILE: &str = "issues.jsonl";
pub const DELETIONS_FILE: &str = "deletions.jsonl";
pub const METADATA_FILE: &str = "metadata.json";
pub const CONFIG_FILE: &str = "config.yaml";
pub const CACHE_FILE: &str = "cache.db";
pub const SYNC_BASE_FILE: &str = "sync_base.jsonl";

pub const ENV_SYNC_BRANCH: &str = "BRAID_SYNC_BRANCH";
pub const ENV_REMOTE: &str = "BRAID_REMOTE";
pub const ENV_ACTOR: &str = "BRAID_ACTOR";
pub const ENV_NO_DB: &str = "BRAID_NO_DB";

/// Contents of `.braid/config.yaml`. All fields optional; absent fields
/// fall through to the store config or built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstone_ttl_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphan_handling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_author: Option<String>,
    #[serde(default)]
    pub no_gpg_sign: bool,
    #[serde(default)]
    pub no_db: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_debounce_ms: Option<u64>,
}

/// A located workspace plus its resolved configuration.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: FileConfig,
}

impl Workspace {
    /// Walk up from `start` looking for a `.braid/` directory.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` when no workspace is found.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let start = dunce::canonicalize(start.as_ref())?;
        let mut current = start.as_path();
        loop {
            let candidate = current.join(BRAID_DIR);
            if candidate.is_dir() {
                return Self::open(current);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return Err(BraidError::NotInitialized),
            }
        }
    }

    /// Open a workspace rooted at `root`, loading `config.yaml` if present.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the YAML is malformed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let config_path = root.join(BRAID_DIR).join(CONFIG_FILE);
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| BraidError::Config(format!("{}: {e}", config_path.display())))?
        } else {
            FileConfig::default()
        };
        Ok(Self { root, config })
    }

    /// Create `.braid/` with an empty log and a starter config.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if `.braid/` exists.
    pub fn init(root: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let braid_dir = root.join(BRAID_DIR);
        if braid_dir.exists() {
            return Err(BraidError::AlreadyInitialized { path: braid_dir });
        }
        std::fs::create_dir_all(&braid_dir)?;
        std::fs::write(braid_dir.join(ISSUES_FILE), "")?;

        let config = FileConfig {
            prefix: Some(prefix.to_string()),
            ..FileConfig::default()
        };
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| BraidError::Config(e.to_string()))?;
        std::fs::write(braid_dir.join(CONFIG_FILE), yaml)?;

        Ok(Self { root, config })
    }

    /// Persist the current config back to `config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Config` on failure.
    pub fn save_config(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.config)
            .map_err(|e| BraidError::Config(e.to_string()))?;
        std::fs::write(self.config_path(), yaml)?;
        Ok(())
    }

    #[must_use]
    pub fn braid_dir(&self) -> PathBuf {
        self.root.join(BRAID_DIR)
    }

    #[must_use]
    pub fn issues_path(&self) -> PathBuf {
        self.braid_dir().join(ISSUES_FILE)
    }

    #[must_use]
    pub fn deletions_path(&self) -> PathBuf {
        self.braid_dir().join(DELETIONS_FILE)
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.braid_dir().join(METADATA_FILE)
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.braid_dir().join(CONFIG_FILE)
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.braid_dir().join(CACHE_FILE)
    }

    #[must_use]
    pub fn sync_base_path(&self) -> PathBuf {
        self.braid_dir().join(SYNC_BASE_FILE)
    }

    /// Sync branch: `BRAID_SYNC_BRANCH` > config.yaml > `store_value`.
    #[must_use]
    pub fn sync_branch(&self, store_value: Option<&str>) -> Option<String> {
        env_nonempty(ENV_SYNC_BRANCH)
            .or_else(|| self.config.sync_branch.clone())
            .or_else(|| store_value.map(String::from))
    }

    /// Remote name, defaulting to `origin`.
    #[must_use]
    pub fn remote(&self) -> String {
        env_nonempty(ENV_REMOTE)
            .or_else(|| self.config.remote.clone())
            .unwrap_or_else(|| "origin".to_string())
    }

    /// Acting user for created-by / deleted-by stamps.
    #[must_use]
    pub fn actor(&self) -> String {
        env_nonempty(ENV_ACTOR)
            .or_else(|| self.config.actor.clone())
            .or_else(|| env_nonempty("USER"))
            .unwrap_or_else(|| "unknown".to_string())
    }

    #[must_use]
    pub fn no_db(&self) -> bool {
        env::var(ENV_NO_DB).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            || self.config.no_db
    }

    #[must_use]
    pub fn tombstone_ttl_days(&self) -> i64 {
        self.config.tombstone_ttl_days.unwrap_or(30)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_then_discover_from_subdir() {
        let dir = tempdir().unwrap();
        Workspace::init(dir.path(), "bi").unwrap();

        let sub = dir.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();
        let ws = Workspace::discover(&sub).unwrap();
        assert_eq!(ws.config.prefix.as_deref(), Some("bi"));
        assert!(ws.issues_path().exists());
    }

    #[test]
    fn double_init_rejected() {
        let dir = tempdir().unwrap();
        Workspace::init(dir.path(), "bi").unwrap();
        let result = Workspace::init(dir.path(), "bi");
        assert!(matches!(result, Err(BraidError::AlreadyInitialized { .. })));
    }

    #[test]
    fn discover_fails_outside_workspace() {
        let dir = tempdir().unwrap();
        let result = Workspace::discover(dir.path());
        assert!(matches!(result, Err(BraidError::NotInitialized)));
    }

    #[test]
    fn malformed_yaml_reported_as_config_error() {
        let dir = tempdir().unwrap();
        let braid_dir = dir.path().join(BRAID_DIR);
        std::fs::create_dir_all(&braid_dir).unwrap();
        std::fs::write(braid_dir.join(CONFIG_FILE), "prefix: [not, a, string").unwrap();
        let result = Workspace::open(dir.path());
        assert!(matches!(result, Err(BraidError::Config(_))));
    }

    #[test]
    fn sync_branch_precedence() {
        let dir = tempdir().unwrap();
        let mut ws = Workspace::init(dir.path(), "bi").unwrap();

        assert_eq!(ws.sync_branch(None), None);
        assert_eq!(
            ws.sync_branch(Some("store-branch")).as_deref(),
            Some("store-branch")
        );

        ws.config.sync_branch = Some("file-branch".to_string());
        assert_eq!(
            ws.sync_branch(Some("store-branch")).as_deref(),
            Some("file-branch")
        );
    }

    #[test]
    fn ttl_defaults_to_thirty_days() {
        let dir = tempdir().unwrap();
        let ws = Workspace::init(dir.path(), "bi").unwrap();
        assert_eq!(ws.tombstone_ttl_days(), 30);
    }
}
