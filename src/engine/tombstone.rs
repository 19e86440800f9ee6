//! Tombstone lifecycle.
//!
//! Deletion is a state transition, not a removal: a tombstoned record
//! keeps its identifier in the log until its time-to-live elapses, so
//! every clone sees the deletion before the record physically
//! disappears. Pruning is the only operation that drops lines from the
//! log, and it rewrites the file atomically.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use braid_core::error::Result;
use braid_core::jsonl;
use braid_core::model::{Issue, Status};

use crate::engine::CancelToken;

/// Outcome of a prune (or its preview).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneResult {
    pub pruned_count: usize,
    /// Identifiers removed, in log order.
    pub pruned_ids: Vec<String>,
    pub ttl_days: i64,
}

/// Expires tombstones whose TTL has elapsed.
pub struct TombstoneLifecycle<'a> {
    ttl_days: i64,
    cancel: &'a CancelToken,
}

impl<'a> TombstoneLifecycle<'a> {
    pub fn new(ttl_days: i64, cancel: &'a CancelToken) -> Self {
        Self { ttl_days, cancel }
    }

    /// Report what a prune at `now` would remove, without touching the log.
    ///
    /// # Errors
    ///
    /// Fails when the log cannot be read or parsed.
    pub fn preview(&self, log_path: &Path, now: DateTime<Utc>) -> Result<PruneResult> {
        let issues = jsonl::load(log_path)?;
        let (_, result) = self.split(issues, now)?;
        Ok(result)
    }

    /// Remove expired tombstones from the log. Surviving lines keep their
    /// original order; the rewrite goes through a temp file and rename.
    ///
    /// # Errors
    ///
    /// Fails when the log cannot be read, parsed, or rewritten.
    pub fn prune(&self, log_path: &Path, now: DateTime<Utc>) -> Result<PruneResult> {
        let issues = jsonl::load(log_path)?;
        let (kept, result) = self.split(issues, now)?;
        if result.pruned_count > 0 {
            jsonl::save(log_path, &kept)?;
            info!(count = result.pruned_count, ttl_days = self.ttl_days, "pruned tombstones");
        }
        Ok(result)
    }

    /// Partition into survivors and a summary of the expired.
    fn split(&self, issues: Vec<Issue>, now: DateTime<Utc>) -> Result<(Vec<Issue>, PruneResult)> {
        let mut kept = Vec::with_capacity(issues.len());
        let mut result = PruneResult {
            ttl_days: self.ttl_days,
            ..PruneResult::default()
        };
        for issue in issues {
            self.cancel.check()?;
            if self.expired(&issue, now) {
                result.pruned_ids.push(issue.id);
            } else {
                kept.push(issue);
            }
        }
        result.pruned_count = result.pruned_ids.len();
        Ok((kept, result))
    }

    /// A tombstone expires once `now - deleted_at` reaches the TTL. A TTL
    /// of zero expires every tombstone. A tombstone without a deletion
    /// timestamp never expires; it stays visible until repaired.
    fn expired(&self, issue: &Issue, now: DateTime<Utc>) -> bool {
        if issue.status != Status::Tombstone {
            return false;
        }
        let Some(deleted_at) = issue.deleted_at else {
            return false;
        };
        (now - deleted_at).num_days() >= self.ttl_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn live(id: &str) -> Issue {
        Issue {
            id: id.to_string(),
            title: format!("issue {id}"),
            ..Default::default()
        }
    }

    fn tombstone(id: &str, deleted_days_ago: i64, now: DateTime<Utc>) -> Issue {
        Issue {
            id: id.to_string(),
            title: format!("issue {id}"),
            status: Status::Tombstone,
            deleted_at: Some(now - Duration::days(deleted_days_ago)),
            deleted_by: Some("alice".to_string()),
            ..Default::default()
        }
    }

    fn write_log(dir: &TempDir, issues: &[Issue]) -> std::path::PathBuf {
        let path = dir.path().join("issues.jsonl");
        jsonl::save(&path, issues).unwrap();
        path
    }

    #[test]
    fn prune_removes_only_expired_tombstones() {
        let now = Utc::now();
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            &[
                live("bi-aaa"),
                tombstone("bi-old", 45, now),
                tombstone("bi-new", 5, now),
                live("bi-bbb"),
            ],
        );

        let cancel = CancelToken::new();
        let result = TombstoneLifecycle::new(30, &cancel).prune(&path, now).unwrap();
        assert_eq!(result.pruned_count, 1);
        assert_eq!(result.pruned_ids, vec!["bi-old".to_string()]);

        let survivors: Vec<String> = jsonl::load(&path)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(survivors, vec!["bi-aaa", "bi-new", "bi-bbb"]);
    }

    #[test]
    fn zero_ttl_expires_everything_deleted() {
        let now = Utc::now();
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, &[tombstone("bi-x", 0, now), live("bi-y")]);

        let cancel = CancelToken::new();
        let result = TombstoneLifecycle::new(0, &cancel).prune(&path, now).unwrap();
        assert_eq!(result.pruned_ids, vec!["bi-x".to_string()]);
    }

    #[test]
    fn preview_leaves_log_untouched() {
        let now = Utc::now();
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, &[tombstone("bi-old", 99, now)]);
        let before = std::fs::read_to_string(&path).unwrap();

        let cancel = CancelToken::new();
        let result = TombstoneLifecycle::new(30, &cancel).preview(&path, now).unwrap();
        assert_eq!(result.pruned_count, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn tombstone_missing_deleted_at_survives() {
        let now = Utc::now();
        let mut broken = tombstone("bi-limbo", 99, now);
        broken.deleted_at = None;
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, &[broken]);

        let cancel = CancelToken::new();
        let result = TombstoneLifecycle::new(0, &cancel).prune(&path, now).unwrap();
        assert_eq!(result.pruned_count, 0);
        assert_eq!(jsonl::load(&path).unwrap().len(), 1);
    }
}
