//! Three-way merge for the issues log.
//!
//! Git sees the log as text, so concurrent edits to different records
//! (or different fields of one record) still produce textual conflicts.
//! This module re-merges at the record level from the index stages:
//! stage 1 is the common ancestor, stage 2 ours, stage 3 theirs. Scalar
//! fields resolve last-writer-wins by `updated_at`; labels and
//! dependency edges union; comments append with deduplication. Only a
//! field changed on both sides to different values at the exact same
//! timestamp is left for the user.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info};

use braid_core::error::{BraidError, Result};
use braid_core::jsonl;
use braid_core::model::Issue;

use crate::engine::CancelToken;
use crate::engine::git::GitRunner;

/// Record-level merge of two divergent log versions against a base.
pub trait RecordMerger {
    fn merge_records(&self, base: &[Issue], ours: &[Issue], theirs: &[Issue]) -> MergeOutcome;
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Merged records, sorted by identifier.
    pub merged: Vec<Issue>,
    /// Fields changed on both sides to different values with equal
    /// timestamps. Anything counted here was resolved arbitrarily and
    /// must not be auto-committed.
    pub conflicts: usize,
}

const RELATION_KEYS: [&str; 3] = ["labels", "dependencies", "comments"];

#[derive(Debug, Default)]
pub struct ThreeWayMerger;

impl RecordMerger for ThreeWayMerger {
    fn merge_records(&self, base: &[Issue], ours: &[Issue], theirs: &[Issue]) -> MergeOutcome {
        let base_by_id = index(base);
        let ours_by_id = index(ours);
        let theirs_by_id = index(theirs);

        let mut ids: Vec<&String> = ours_by_id.keys().chain(theirs_by_id.keys()).collect();
        ids.sort();
        ids.dedup();

        let mut outcome = MergeOutcome::default();
        for id in ids {
            let b = base_by_id.get(id).copied();
            match (ours_by_id.get(id).copied(), theirs_by_id.get(id).copied()) {
                (Some(l), Some(r)) => {
                    let merged = merge_pair(b, l, r, &mut outcome.conflicts);
                    outcome.merged.push(merged);
                }
                // Present on one side only. With a base entry the other
                // side pruned it; a prune loses to a concurrent edit but
                // wins over no edit at all.
                (Some(side), None) | (None, Some(side)) => {
                    let survives = match b {
                        None => true,
                        Some(b) => side != b,
                    };
                    if survives {
                        outcome.merged.push(side.clone());
                    } else {
                        debug!(id = %side.id, "record pruned on the other side");
                    }
                }
                (None, None) => unreachable!("id came from one of the sides"),
            }
        }
        outcome
    }
}

fn index(issues: &[Issue]) -> BTreeMap<String, &Issue> {
    issues.iter().map(|i| (i.id.clone(), i)).collect()
}

/// Merge one record present on both sides.
fn merge_pair(base: Option<&Issue>, ours: &Issue, theirs: &Issue, conflicts: &mut usize) -> Issue {
    if ours == theirs {
        return ours.clone();
    }

    let base_map = base.map(to_map).unwrap_or_default();
    let ours_map = to_map(ours);
    let theirs_map = to_map(theirs);
    let ours_newer = ours.updated_at >= theirs.updated_at;

    let mut keys: Vec<&String> = ours_map.keys().chain(theirs_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut merged = Map::new();
    for key in keys {
        if RELATION_KEYS.contains(&key.as_str()) {
            continue;
        }
        let b = base_map.get(key).unwrap_or(&Value::Null);
        let l = ours_map.get(key).unwrap_or(&Value::Null);
        let r = theirs_map.get(key).unwrap_or(&Value::Null);
        let picked = if l == r {
            l
        } else if l == b {
            r
        } else if r == b {
            l
        } else {
            // Changed on both sides to different values.
            if ours.updated_at == theirs.updated_at {
                *conflicts += 1;
            }
            if ours_newer { l } else { r }
        };
        if !picked.is_null() {
            merged.insert(key.clone(), picked.clone());
        }
    }

    // A field edit on either side moves the merged record forward.
    let newest = ours.updated_at.max(theirs.updated_at);
    merged.insert(
        "updated_at".to_string(),
        Value::String(newest.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)),
    );

    let mut result: Issue = serde_json::from_value(Value::Object(merged))
        .unwrap_or_else(|_| ours.clone());
    result.labels = union_labels(ours, theirs);
    result.dependencies = union_dependencies(ours, theirs);
    result.comments = union_comments(ours, theirs);
    result.content_hash = Some(result.compute_content_hash());
    result
}

fn to_map(issue: &Issue) -> Map<String, Value> {
    match serde_json::to_value(issue) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn union_labels(ours: &Issue, theirs: &Issue) -> Vec<String> {
    let mut labels = ours.labels.clone();
    for label in &theirs.labels {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }
    labels
}

fn union_dependencies(ours: &Issue, theirs: &Issue) -> Vec<braid_core::model::Dependency> {
    let mut seen: HashSet<(String, String)> = ours
        .dependencies
        .iter()
        .map(braid_core::model::Dependency::merge_key)
        .collect();
    let mut deps = ours.dependencies.clone();
    for dep in &theirs.dependencies {
        if seen.insert(dep.merge_key()) {
            deps.push(dep.clone());
        }
    }
    deps
}

fn union_comments(ours: &Issue, theirs: &Issue) -> Vec<braid_core::model::Comment> {
    let mut seen: HashSet<(String, String, String)> = ours
        .comments
        .iter()
        .map(|c| (c.author.clone(), c.created_at.to_rfc3339(), c.body.clone()))
        .collect();
    let mut comments = ours.comments.clone();
    for comment in &theirs.comments {
        let key = (
            comment.author.clone(),
            comment.created_at.to_rfc3339(),
            comment.body.clone(),
        );
        if seen.insert(key) {
            comments.push(comment.clone());
        }
    }
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    comments
}

/// Drives a record-level re-merge of a conflicted log file.
pub struct MergeResolver<'a> {
    git: &'a GitRunner,
    cancel: &'a CancelToken,
}

impl<'a> MergeResolver<'a> {
    pub fn new(git: &'a GitRunner, cancel: &'a CancelToken) -> Self {
        Self { git, cancel }
    }

    /// True when the working copy of the file carries conflict markers.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read.
    pub fn needs_resolution(&self, workdir_path: &Path) -> Result<bool> {
        jsonl::has_conflict_markers(workdir_path)
    }

    /// Re-merge `repo_rel` from the index stages, write the result over
    /// the conflicted working copy, and stage it. Returns the merged
    /// records so the caller can re-import them.
    ///
    /// # Errors
    ///
    /// `MergeConflict` when the index stages are gone (the merge was
    /// already concluded textually) or when records genuinely diverge.
    pub fn resolve_file(&self, workdir_path: &Path, repo_rel: &str) -> Result<Vec<Issue>> {
        self.cancel.check()?;
        let scratch = tempfile::Builder::new().prefix("braid-merge-").tempdir()?;
        let base = self.stage(&scratch, 1, "base.jsonl", repo_rel)?;
        let ours = self.stage(&scratch, 2, "ours.jsonl", repo_rel)?;
        let theirs = self.stage(&scratch, 3, "theirs.jsonl", repo_rel)?;

        let (Some(ours), Some(theirs)) = (ours, theirs) else {
            return Err(BraidError::MergeConflict {
                remaining: count_marker_blocks(workdir_path)?,
                path: repo_rel.to_string(),
            });
        };
        let base = base.unwrap_or_default();

        let outcome = ThreeWayMerger.merge_records(&base, &ours, &theirs);
        if outcome.conflicts > 0 {
            return Err(BraidError::MergeConflict {
                remaining: outcome.conflicts,
                path: repo_rel.to_string(),
            });
        }

        jsonl::save(workdir_path, &outcome.merged)?;
        self.git.add(&[repo_rel], self.cancel)?;
        info!(
            path = repo_rel,
            records = outcome.merged.len(),
            "resolved log conflict at the record level"
        );
        Ok(outcome.merged)
    }

    /// Fetch one index stage and park it in the scratch directory before
    /// parsing. Each side of the merge exists on disk as its own file
    /// while the resolution runs.
    fn stage(
        &self,
        scratch: &tempfile::TempDir,
        stage: u8,
        name: &str,
        repo_rel: &str,
    ) -> Result<Option<Vec<Issue>>> {
        let Some(bytes) = self.git.show_stage(stage, repo_rel, self.cancel)? else {
            return Ok(None);
        };
        let path = scratch.path().join(name);
        std::fs::write(&path, &bytes)?;
        debug!(stage, path = %path.display(), "extracted merge stage");
        let content = std::fs::read_to_string(&path)?;
        jsonl::parse(&content).map(Some)
    }
}

fn count_marker_blocks(path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| line.starts_with("<<<<<<< "))
        .count()
        .max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::model::{Comment, Dependency, DependencyType, Priority, Status};
    use chrono::{TimeZone, Utc};

    fn issue(id: &str, title: &str, updated_minute: u32) -> Issue {
        Issue {
            id: id.to_string(),
            title: title.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, updated_minute, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn newer_side_wins_contested_scalar() {
        let base = issue("bi-a", "Original", 0);
        let mut ours = issue("bi-a", "Ours", 5);
        ours.priority = Priority::HIGH;
        let theirs = issue("bi-a", "Theirs", 9);

        let outcome = ThreeWayMerger.merge_records(
            &[base],
            std::slice::from_ref(&ours),
            std::slice::from_ref(&theirs),
        );
        assert_eq!(outcome.conflicts, 0);
        let merged = &outcome.merged[0];
        assert_eq!(merged.title, "Theirs");
        // Only we touched priority, so our edit survives the newer side.
        assert_eq!(merged.priority, Priority::HIGH);
        assert_eq!(merged.updated_at, theirs.updated_at);
    }

    #[test]
    fn independent_field_edits_both_survive() {
        let base = issue("bi-a", "Original", 0);
        let mut ours = base.clone();
        ours.assignee = Some("alice".to_string());
        ours.updated_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let mut theirs = base.clone();
        theirs.status = Status::InProgress;
        theirs.updated_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 3, 0).unwrap();

        let outcome =
            ThreeWayMerger.merge_records(&[base], &[ours], &[theirs]);
        let merged = &outcome.merged[0];
        assert_eq!(merged.assignee.as_deref(), Some("alice"));
        assert_eq!(merged.status, Status::InProgress);
    }

    #[test]
    fn same_timestamp_divergence_counts_as_conflict() {
        let base = issue("bi-a", "Original", 0);
        let ours = issue("bi-a", "Ours", 5);
        let theirs = issue("bi-a", "Theirs", 5);

        let outcome =
            ThreeWayMerger.merge_records(&[base], &[ours], &[theirs]);
        assert_eq!(outcome.conflicts, 1);
    }

    #[test]
    fn additions_on_both_sides_are_kept_sorted() {
        let base = issue("bi-a", "Shared", 0);
        let ours = vec![base.clone(), issue("bi-c", "From ours", 1)];
        let theirs = vec![base.clone(), issue("bi-b", "From theirs", 1)];

        let outcome = ThreeWayMerger.merge_records(&[base], &ours, &theirs);
        let ids: Vec<&str> = outcome.merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["bi-a", "bi-b", "bi-c"]);
    }

    #[test]
    fn prune_loses_to_concurrent_edit() {
        let base = issue("bi-a", "Original", 0);

        // Theirs pruned it, ours edited it.
        let ours = issue("bi-a", "Edited", 5);
        let outcome = ThreeWayMerger.merge_records(
            std::slice::from_ref(&base),
            std::slice::from_ref(&ours),
            &[],
        );
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].title, "Edited");

        // Theirs pruned it, ours left it alone.
        let outcome = ThreeWayMerger.merge_records(&[base.clone()], &[base], &[]);
        assert!(outcome.merged.is_empty());
    }

    #[test]
    fn labels_and_dependencies_union() {
        let base = issue("bi-a", "Shared", 0);
        let mut ours = base.clone();
        ours.labels = vec!["backend".to_string()];
        ours.dependencies = vec![Dependency {
            issue_id: "bi-a".to_string(),
            depends_on_id: "bi-x".to_string(),
            dep_type: DependencyType::Blocks,
            created_at: base.created_at,
            created_by: None,
        }];
        let mut theirs = base.clone();
        theirs.labels = vec!["backend".to_string(), "urgent".to_string()];
        theirs.dependencies = vec![Dependency {
            issue_id: "bi-a".to_string(),
            depends_on_id: "bi-x".to_string(),
            dep_type: DependencyType::Blocks,
            created_at: base.created_at,
            created_by: Some("bob".to_string()),
        }];

        let outcome =
            ThreeWayMerger.merge_records(&[base], &[ours], &[theirs]);
        let merged = &outcome.merged[0];
        assert_eq!(merged.labels, vec!["backend", "urgent"]);
        // Keyed by (target, type): the duplicate edge collapses.
        assert_eq!(merged.dependencies.len(), 1);
    }

    #[test]
    fn comments_append_and_dedup() {
        let base = issue("bi-a", "Shared", 0);
        let shared = Comment {
            id: 1,
            issue_id: "bi-a".to_string(),
            author: "alice".to_string(),
            body: "first".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap(),
        };
        let mut ours = base.clone();
        ours.comments = vec![shared.clone()];
        let mut theirs = base.clone();
        theirs.comments = vec![
            shared,
            Comment {
                id: 2,
                issue_id: "bi-a".to_string(),
                author: "bob".to_string(),
                body: "second".to_string(),
                created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 2, 0).unwrap(),
            },
        ];

        let outcome =
            ThreeWayMerger.merge_records(&[base], &[ours], &[theirs]);
        let merged = &outcome.merged[0];
        assert_eq!(merged.comments.len(), 2);
        assert_eq!(merged.comments[1].body, "second");
    }
}
