//! Branch-based synchronization.
//!
//! A sync commits the exported log, reconciles with the remote, imports
//! whatever came back, and pushes. Commits are restricted to the
//! synchronization pathspec so an unrelated change the user has staged
//! is never swept into a sync commit. Divergence between local and
//! remote tips (a forced push, usually) is a blocking error, never
//! silently resolved.

use std::fs;

use serde::Serialize;
use tracing::{debug, info, warn};

use braid_core::error::{BraidError, Result};
use braid_core::jsonl;

use crate::config::Workspace;
use crate::engine::CancelToken;
use crate::engine::git::GitRunner;
use crate::engine::import::{ImportOptions, ImportPipeline, ImportResult};
use crate::engine::merge::MergeResolver;
use crate::storage::Storage;

/// Files a sync commit may touch. Nothing else is ever staged or
/// committed by the coordinator.
pub const SYNC_PATHS: [&str; 3] = [
    ".braid/issues.jsonl",
    ".braid/deletions.jsonl",
    ".braid/metadata.json",
];

const LOG_REPO_PATH: &str = ".braid/issues.jsonl";

/// Relationship between the local branch tip and its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// Tips are equal.
    InSync,
    /// Local is strictly ahead; a push suffices.
    Ahead,
    /// Local is strictly behind; a pull suffices.
    Behind,
    /// Mutual non-ancestors. Blocking.
    Diverged,
}

impl Divergence {
    #[must_use]
    pub const fn is_diverged(self) -> bool {
        matches!(self, Self::Diverged)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Report what would happen without committing, pulling, or pushing.
    pub dry_run: bool,
    /// Only bring remote changes into the cache; never commit or push.
    pub import_only: bool,
    /// Force the one-directional sync-from-default-branch fallback.
    pub from_main: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub committed: bool,
    pub pulled: bool,
    pub pushed: bool,
    /// Records re-merged from a conflicted log, when that happened.
    pub merged_records: Option<usize>,
    pub import: Option<ImportResult>,
}

pub struct SyncCoordinator<'a> {
    workspace: &'a Workspace,
    git: GitRunner,
    cancel: &'a CancelToken,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(workspace: &'a Workspace, cancel: &'a CancelToken) -> Self {
        let git = GitRunner::new(&workspace.root);
        Self {
            workspace,
            git,
            cancel,
        }
    }

    /// Compare local and remote tips of `branch` with ancestor tests.
    ///
    /// A remote ref that does not exist yet reads as `Ahead`: everything
    /// local still needs its first push.
    ///
    /// # Errors
    ///
    /// Returns `Git` when the underlying ancestor tests fail.
    pub fn detect_divergence(&self, remote: &str, branch: &str) -> Result<Divergence> {
        let remote_ref = format!("{remote}/{branch}");
        if !self.git.ref_exists(&remote_ref, self.cancel) {
            return Ok(Divergence::Ahead);
        }
        let local_behind = self.git.is_ancestor(branch, &remote_ref, self.cancel)?;
        let remote_behind = self.git.is_ancestor(&remote_ref, branch, self.cancel)?;
        Ok(match (local_behind, remote_behind) {
            (true, true) => Divergence::InSync,
            (true, false) => Divergence::Behind,
            (false, true) => Divergence::Ahead,
            (false, false) => Divergence::Diverged,
        })
    }

    /// Full synchronization cycle.
    ///
    /// # Errors
    ///
    /// `Divergence` when the remote was forced-pushed, `MergeConflict`
    /// when a log conflict cannot be resolved at the record level, plus
    /// any git or import failure.
    pub fn sync(&self, store: &mut dyn Storage, options: &SyncOptions) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let branch = self.resolve_branch(store)?;

        if options.from_main || (branch.is_none() && !self.git.has_upstream(self.cancel)) {
            return self.sync_from_default(store, options);
        }
        let branch = match branch {
            Some(branch) => branch,
            None => self.git.current_branch(self.cancel)?,
        };
        let remote = self.workspace.remote();

        // A log left conflicted by an earlier pull blocks everything else.
        let log_path = self.workspace.issues_path();
        let resolver = MergeResolver::new(&self.git, self.cancel);
        if log_path.exists() && resolver.needs_resolution(&log_path)? {
            let merged = resolver.resolve_file(&log_path, LOG_REPO_PATH)?;
            report.merged_records = Some(merged.len());
        }

        if !options.import_only {
            self.export_log(store)?;
            if self.log_differs_from_head()? {
                if options.dry_run {
                    info!("dry run: would commit issue log");
                } else {
                    self.commit(options.message.as_deref())?;
                    report.committed = true;
                }
            }
        }

        if !options.dry_run {
            if let Err(e) = self.git.fetch(&remote, &branch, self.cancel) {
                // No remote configured is a normal local-only setup.
                warn!(error = %e, "fetch failed; continuing with local state");
            }
        }
        match self.detect_divergence(&remote, &branch)? {
            Divergence::Diverged => {
                return Err(BraidError::Divergence { branch, remote });
            }
            Divergence::Behind | Divergence::InSync if !options.dry_run => {
                self.git.pull(&remote, &branch, self.cancel)?;
                report.pulled = true;
                if resolver.needs_resolution(&log_path)? {
                    let merged = resolver.resolve_file(&log_path, LOG_REPO_PATH)?;
                    report.merged_records = Some(merged.len());
                }
            }
            _ => {}
        }

        report.import = Some(self.import_log(store, options)?);
        self.save_sync_base()?;

        if !options.import_only && !options.dry_run {
            self.git.push(&remote, &branch, self.cancel)?;
            report.pushed = true;
            // The sync branch owns the authoritative copy; the working
            // tree goes back to whatever is committed here.
            self.git.checkout_paths("HEAD", &[LOG_REPO_PATH], self.cancel)?;
        }
        info!(
            branch = %branch,
            committed = report.committed,
            pulled = report.pulled,
            pushed = report.pushed,
            "sync finished"
        );
        Ok(report)
    }

    /// Commit the log when it differs from HEAD, touching nothing else.
    /// The flush-only path exports and commits without going near the
    /// remote.
    ///
    /// # Errors
    ///
    /// Returns `Git` when staging or committing fails.
    pub fn commit_log(&self, message: Option<&str>) -> Result<bool> {
        if self.log_differs_from_head()? {
            self.commit(message)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// One-directional fallback: adopt the default branch's log wholesale.
    /// Local-only records are discarded without deletion records, because
    /// backfilling tombstones for entries that never left this clone would
    /// manufacture deletions nobody performed.
    fn sync_from_default(
        &self,
        store: &mut dyn Storage,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let branch = self
            .git
            .default_branch(self.cancel)
            .ok_or_else(|| BraidError::Config("no main or master branch to sync from".into()))?;
        info!(branch = %branch, "one-directional sync from default branch");

        let Some(bytes) = self.git.show(&branch, LOG_REPO_PATH, self.cancel)? else {
            debug!("default branch carries no issue log; nothing to import");
            return Ok(report);
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        report.import = Some(self.import_log_content(store, &content, options)?);
        if !options.dry_run {
            fs::write(self.workspace.issues_path(), &content)?;
        }
        Ok(report)
    }

    /// Branch precedence: environment, then config file, then the value
    /// older clones left in the store's config table.
    fn resolve_branch(&self, store: &dyn Storage) -> Result<Option<String>> {
        let legacy = store.get_config("sync_branch")?;
        let branch = self.workspace.sync_branch(legacy.as_deref());
        if let Some(branch) = &branch {
            if branch == "main" || branch == "master" {
                return Err(BraidError::Config(format!(
                    "'{branch}' cannot be the dedicated sync branch; pick a branch that only carries issue data"
                )));
            }
        }
        Ok(branch)
    }

    fn export_log(&self, store: &mut dyn Storage) -> Result<()> {
        if store.dirty_count()? == 0 {
            return Ok(());
        }
        let issues = store.export_issues()?;
        jsonl::save(&self.workspace.issues_path(), &issues)?;
        store.clear_dirty()?;
        Ok(())
    }

    /// Change detection against the committed log itself. Ignore rules on
    /// the working branch may hide the data file from `git status`, so the
    /// bytes are compared directly.
    fn log_differs_from_head(&self) -> Result<bool> {
        let working = match fs::read(self.workspace.issues_path()) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        match self.git.show("HEAD", LOG_REPO_PATH, self.cancel)? {
            Some(committed) => Ok(committed != working),
            None => Ok(true),
        }
    }

    fn commit(&self, message: Option<&str>) -> Result<()> {
        // Only the sync files that exist; a pathspec naming a file that
        // was never created makes git add fail outright.
        let paths: Vec<&str> = SYNC_PATHS
            .iter()
            .copied()
            .filter(|p| self.workspace.root.join(p).exists())
            .collect();
        self.git.add(&paths, self.cancel)?;
        self.git.commit_paths(
            message.unwrap_or("braid: sync issue log"),
            &paths,
            self.workspace.config.commit_author.as_deref(),
            self.workspace.config.no_gpg_sign,
            self.cancel,
        )
    }

    fn import_log(&self, store: &mut dyn Storage, options: &SyncOptions) -> Result<ImportResult> {
        let path = self.workspace.issues_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        self.import_log_content(store, &content, options)
    }

    fn import_log_content(
        &self,
        store: &mut dyn Storage,
        content: &str,
        options: &SyncOptions,
    ) -> Result<ImportResult> {
        let import_options = ImportOptions {
            dry_run: options.dry_run,
            actor: self.workspace.actor(),
            ..ImportOptions::default()
        };
        ImportPipeline::new(store, self.cancel).run(content, &import_options)
    }

    /// Remember the log as imported; the next three-way merge uses it as
    /// the base when the merge index is unavailable.
    fn save_sync_base(&self) -> Result<()> {
        let src = self.workspace.issues_path();
        if src.exists() {
            fs::copy(&src, self.workspace.sync_base_path())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BRAID_DIR;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }

    fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        git(dir, &["add", name]);
        git(dir, &["commit", "-m", message]);
    }

    fn coordinator_fixture(dir: &Path) -> Workspace {
        Workspace {
            root: dir.to_path_buf(),
            config: crate::config::FileConfig::default(),
        }
    }

    #[test]
    fn divergence_states() {
        let upstream_dir = TempDir::new().unwrap();
        init_repo(upstream_dir.path());
        commit_file(upstream_dir.path(), "a.txt", "one", "first");

        let clone_dir = TempDir::new().unwrap();
        let clone = clone_dir.path().join("repo");
        git(
            upstream_dir.path(),
            &["clone", ".", clone.to_str().unwrap()],
        );
        git(&clone, &["config", "user.name", "Test"]);
        git(&clone, &["config", "user.email", "test@example.com"]);

        let cancel = CancelToken::new();
        let workspace = coordinator_fixture(&clone);
        let coordinator = SyncCoordinator::new(&workspace, &cancel);

        assert_eq!(
            coordinator.detect_divergence("origin", "main").unwrap(),
            Divergence::InSync
        );

        // Local-only commit: strictly ahead.
        commit_file(&clone, "b.txt", "two", "local");
        assert_eq!(
            coordinator.detect_divergence("origin", "main").unwrap(),
            Divergence::Ahead
        );

        // Upstream moves too, on a different file: diverged.
        commit_file(upstream_dir.path(), "c.txt", "three", "upstream");
        git(&clone, &["fetch", "origin", "main"]);
        assert_eq!(
            coordinator.detect_divergence("origin", "main").unwrap(),
            Divergence::Diverged
        );

        // Drop the local commit: strictly behind.
        git(&clone, &["reset", "--hard", "HEAD~1"]);
        assert_eq!(
            coordinator.detect_divergence("origin", "main").unwrap(),
            Divergence::Behind
        );
    }

    #[test]
    fn missing_remote_ref_reads_as_ahead() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        commit_file(dir.path(), "a.txt", "one", "first");

        let cancel = CancelToken::new();
        let workspace = coordinator_fixture(dir.path());
        let coordinator = SyncCoordinator::new(&workspace, &cancel);
        assert_eq!(
            coordinator.detect_divergence("origin", "main").unwrap(),
            Divergence::Ahead
        );
    }

    #[test]
    fn main_rejected_as_dedicated_sync_branch() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        std::fs::create_dir_all(dir.path().join(BRAID_DIR)).unwrap();

        let mut workspace = coordinator_fixture(dir.path());
        workspace.config.sync_branch = Some("main".to_string());
        let cancel = CancelToken::new();
        let coordinator = SyncCoordinator::new(&workspace, &cancel);

        let mut store = braid_core::MemStore::new();
        let err = coordinator
            .sync(&mut store, &SyncOptions::default())
            .unwrap_err();
        assert!(matches!(err, BraidError::Config(_)));
    }

    #[test]
    fn commit_is_scoped_to_sync_paths() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        std::fs::create_dir_all(dir.path().join(BRAID_DIR)).unwrap();
        commit_file(dir.path(), "code.rs", "fn main() {}", "code");

        // An unrelated staged change must survive the sync commit.
        std::fs::write(dir.path().join("code.rs"), "fn main() { /* v2 */ }").unwrap();
        git(dir.path(), &["add", "code.rs"]);

        let workspace = coordinator_fixture(dir.path());
        let cancel = CancelToken::new();
        let coordinator = SyncCoordinator::new(&workspace, &cancel);

        let mut store = braid_core::MemStore::new();
        store
            .create_issue(
                &braid_core::Issue {
                    id: "bi-abc".to_string(),
                    title: "First".to_string(),
                    ..Default::default()
                },
                "tester",
            )
            .unwrap();
        coordinator.export_log(&mut store).unwrap();
        coordinator.commit(None).unwrap();

        let out = Command::new("git")
            .arg("-C")
            .arg(dir.path())
            .args(["status", "--porcelain"])
            .output()
            .unwrap();
        let status = String::from_utf8(out.stdout).unwrap();
        assert!(status.contains("M  code.rs"), "unrelated change swept into sync commit: {status}");

        let out = Command::new("git")
            .arg("-C")
            .arg(dir.path())
            .args(["show", "--name-only", "--format=", "HEAD"])
            .output()
            .unwrap();
        let files = String::from_utf8(out.stdout).unwrap();
        assert!(files.contains(".braid/issues.jsonl"));
        assert!(!files.contains("code.rs"));
    }

    #[test]
    fn from_main_fallback_adopts_default_branch_log() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        std::fs::create_dir_all(dir.path().join(BRAID_DIR)).unwrap();

        let line = r#"{"id":"bi-abc","title":"From main","status":"open","priority":2,"issue_type":"task","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}"#;
        std::fs::write(dir.path().join(".braid/issues.jsonl"), format!("{line}\n")).unwrap();
        git(dir.path(), &["add", ".braid/issues.jsonl"]);
        git(dir.path(), &["commit", "-m", "log"]);

        // Local-only record in the cache; the fallback must not keep it.
        std::fs::write(dir.path().join(".braid/issues.jsonl"), "").unwrap();

        let workspace = coordinator_fixture(dir.path());
        let cancel = CancelToken::new();
        let coordinator = SyncCoordinator::new(&workspace, &cancel);

        let mut store = braid_core::MemStore::new();
        let report = coordinator
            .sync(
                &mut store,
                &SyncOptions {
                    from_main: true,
                    ..SyncOptions::default()
                },
            )
            .unwrap();
        let import = report.import.unwrap();
        assert_eq!(import.created, 1);
        assert!(store.id_exists("bi-abc"));
        let restored = std::fs::read_to_string(dir.path().join(".braid/issues.jsonl")).unwrap();
        assert!(restored.contains("bi-abc"));
    }
}
