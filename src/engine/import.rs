//! Import pipeline.
//!
//! Parse -> prefix setup -> per-record validate / diff / resolve / apply
//! -> finalize. Parse failures are fatal for the whole batch; validation
//! failures are skipped and counted unless strict mode is on.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use braid_core::error::{BraidError, Result};
use braid_core::model::Issue;

use crate::engine::CancelToken;
use crate::engine::collision::{self, CollisionStrategy, DuplicateRefPolicy};
use crate::engine::diff;
use crate::storage::Storage;
use crate::validation::IssueValidator;

/// What to do with a dependency edge whose target exists neither in the
/// batch nor in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Fail the import.
    Strict,
    /// Materialize a placeholder target.
    Resurrect,
    /// Drop the offending edge, keep the record.
    Skip,
    /// Insert the edge regardless. The default: availability over strict
    /// integrity.
    #[default]
    Allow,
}

impl FromStr for OrphanPolicy {
    type Err = BraidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "resurrect" => Ok(Self::Resurrect),
            "skip" => Ok(Self::Skip),
            "allow" => Ok(Self::Allow),
            other => Err(BraidError::Config(format!(
                "unknown orphan-handling mode '{other}' (expected strict, resurrect, skip, or allow)"
            ))),
        }
    }
}

/// Per-operation configuration.
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ImportOptions {
    pub dry_run: bool,
    /// Validation failures become fatal instead of skipped.
    pub strict: bool,
    /// Rename foreign-prefixed identifiers to the configured prefix and
    /// remap collided identifiers instead of aborting.
    pub rename_on_import: bool,
    /// Leave records whose identifier already exists untouched.
    pub skip_existing: bool,
    pub orphans: OrphanPolicy,
    pub duplicate_refs: DuplicateRefPolicy,
    /// Acting user stamped onto placeholder records.
    pub actor: String,
}

/// Outcome counters plus the identifier-remapping table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub collisions: usize,
    /// old -> new identifier pairs, in application order.
    pub remapped: Vec<(String, String)>,
    /// (from, to) edges dropped under the skip orphan policy.
    pub skipped_dependencies: Vec<(String, String)>,
    pub dry_run: bool,
}

pub struct ImportPipeline<'a> {
    store: &'a mut dyn Storage,
    cancel: &'a CancelToken,
}

impl<'a> ImportPipeline<'a> {
    pub fn new(store: &'a mut dyn Storage, cancel: &'a CancelToken) -> Self {
        Self { store, cancel }
    }

    /// Run the full pipeline over raw JSONL content.
    ///
    /// # Errors
    ///
    /// Returns `JsonlParse` (fatal), `Collision`, `PrefixMismatch`,
    /// `DuplicateExternalRef`, `DependencyNotFound` (strict orphans), or
    /// validation errors in strict mode.
    pub fn run(&mut self, content: &str, options: &ImportOptions) -> Result<ImportResult> {
        let mut result = ImportResult {
            dry_run: options.dry_run,
            ..ImportResult::default()
        };

        let parsed = parse_batch(content)?;
        if parsed.is_empty() {
            return Ok(result);
        }
        let raw_by_id: HashMap<String, Map<String, Value>> = parsed
            .iter()
            .map(|(map, issue)| (issue.id.clone(), map.clone()))
            .collect();
        let mut issues: Vec<Issue> = parsed.into_iter().map(|(_, issue)| issue).collect();

        // Prefix: adopt from the batch when nothing is configured yet,
        // otherwise enforce, renaming under --rename-on-import.
        let prefix = match self.store.get_config("prefix")? {
            Some(prefix) => prefix,
            None => {
                let detected = most_common_prefix(&issues)
                    .unwrap_or_else(|| braid_core::store::DEFAULT_PREFIX.to_string());
                info!(prefix = %detected, "adopting namespace prefix from batch");
                if !options.dry_run {
                    self.store.set_config("prefix", &detected)?;
                }
                detected
            }
        };
        {
            let store = &*self.store;
            let mapping = collision::enforce_prefix(
                &mut issues,
                &prefix,
                options.rename_on_import,
                |id| store.id_exists(id).unwrap_or(false),
            )?;
            result.remapped.extend(mapping);
        }

        collision::check_external_refs(&mut issues, options.duplicate_refs)?;

        // Classify, resolve collisions, reclassify: remapped records come
        // back out of the second pass as plain creates.
        let strategy = if options.rename_on_import {
            CollisionStrategy::Remap
        } else {
            CollisionStrategy::Strict
        };
        let first_pass = collision::partition(issues.clone(), |id| self.lookup(id))?;
        result.collisions = first_pass.collide.len();
        if !first_pass.collide.is_empty() {
            let store = &*self.store;
            let mapping =
                collision::resolve(&mut issues, &first_pass.collide, strategy, |id| {
                    store.id_exists(id).unwrap_or(false)
                })?;
            result.remapped.extend(mapping);
        }
        let partition = collision::partition(issues.clone(), |id| self.lookup(id))?;

        let batch_ids: HashSet<String> = issues.iter().map(|i| i.id.clone()).collect();

        for issue in partition.unchanged {
            self.cancel.check()?;
            if options.skip_existing {
                result.skipped += 1;
            } else {
                result.unchanged += 1;
            }
            debug!(id = %issue.id, "unchanged");
        }

        for mut issue in partition.create {
            self.cancel.check()?;
            if !self.admit(&issue, options, &mut result)? {
                continue;
            }
            self.resolve_orphans(&mut issue, &batch_ids, options, &mut result)?;
            if !options.dry_run {
                self.store.put_imported(issue)?;
            }
            result.created += 1;
        }

        for mut issue in partition.update {
            self.cancel.check()?;
            if options.skip_existing {
                result.skipped += 1;
                continue;
            }
            if !self.admit(&issue, options, &mut result)? {
                continue;
            }
            // Hash said different; the tolerant comparator gets the final
            // word so representational drift alone never counts.
            let existing = self.store.get_issue(&issue.id)?;
            if let Some(raw) = raw_by_id.get(&issue.id) {
                if !diff::record_changed(&existing, raw) {
                    result.unchanged += 1;
                    continue;
                }
            }
            self.resolve_orphans(&mut issue, &batch_ids, options, &mut result)?;
            if !options.dry_run {
                self.store.put_imported(issue)?;
            }
            result.updated += 1;
        }

        if !options.dry_run {
            self.finalize(content)?;
        }
        info!(
            created = result.created,
            updated = result.updated,
            unchanged = result.unchanged,
            skipped = result.skipped,
            "import finished"
        );
        Ok(result)
    }

    fn lookup(&self, id: &str) -> Result<Option<Issue>> {
        match self.store.get_issue(id) {
            Ok(issue) => Ok(Some(issue)),
            Err(BraidError::IssueNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Validate; true means the record proceeds, false means skipped.
    fn admit(
        &self,
        issue: &Issue,
        options: &ImportOptions,
        result: &mut ImportResult,
    ) -> Result<bool> {
        match IssueValidator::validate(issue) {
            Ok(()) => Ok(true),
            Err(errors) => {
                if options.strict {
                    return Err(BraidError::from_validation_errors(errors));
                }
                warn!(id = %issue.id, ?errors, "skipping invalid record");
                result.skipped += 1;
                Ok(false)
            }
        }
    }

    fn resolve_orphans(
        &mut self,
        issue: &mut Issue,
        batch_ids: &HashSet<String>,
        options: &ImportOptions,
        result: &mut ImportResult,
    ) -> Result<()> {
        let mut kept = Vec::with_capacity(issue.dependencies.len());
        for dep in issue.dependencies.drain(..) {
            let target = &dep.depends_on_id;
            let known = batch_ids.contains(target) || self.store.id_exists(target)?;
            if known {
                kept.push(dep);
                continue;
            }
            match options.orphans {
                OrphanPolicy::Strict => {
                    return Err(BraidError::DependencyNotFound {
                        id: target.clone(),
                    });
                }
                OrphanPolicy::Resurrect => {
                    debug!(id = %target, "materializing placeholder for orphaned edge");
                    if !options.dry_run {
                        self.store.put_imported(placeholder(target, &options.actor))?;
                    }
                    result.created += 1;
                    kept.push(dep);
                }
                OrphanPolicy::Skip => {
                    result
                        .skipped_dependencies
                        .push((dep.issue_id.clone(), target.clone()));
                    warn!(from = %dep.issue_id, to = %target, "dropping orphaned edge");
                }
                OrphanPolicy::Allow => {
                    debug!(from = %dep.issue_id, to = %target, "keeping orphaned edge");
                    kept.push(dep);
                }
            }
        }
        issue.dependencies = kept;
        Ok(())
    }

    /// Persist last-import metadata. Staleness checks compare the stored
    /// hash against the log on disk; a mismatch triggers a re-import.
    fn finalize(&mut self, content: &str) -> Result<()> {
        let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
        self.store.set_metadata("last_import_hash", &digest)?;
        self.store
            .set_metadata("last_import_at", &Utc::now().to_rfc3339())?;
        Ok(())
    }
}

/// Parse JSONL into (raw object, typed record) pairs.
///
/// Empty lines are skipped; anything else that fails to parse is fatal
/// with a 1-based line number.
fn parse_batch(content: &str) -> Result<Vec<(Map<String, Value>, Issue)>> {
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| BraidError::JsonlParse {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        let Value::Object(mut map) = value else {
            return Err(BraidError::JsonlParse {
                line: idx + 1,
                reason: "expected a JSON object".to_string(),
            });
        };
        diff::normalize_numbers(&mut map);
        let issue: Issue =
            serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
                BraidError::JsonlParse {
                    line: idx + 1,
                    reason: e.to_string(),
                }
            })?;
        records.push((map, issue));
    }
    Ok(records)
}

fn most_common_prefix(issues: &[Issue]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for issue in issues {
        if let Some((prefix, _)) = braid_core::hash::split_id(&issue.id) {
            *counts.entry(prefix).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(p, _)| p.to_string())
}

fn placeholder(id: &str, actor: &str) -> Issue {
    let now = Utc::now();
    Issue {
        id: id.to_string(),
        title: format!("[placeholder] resurrected target {id}"),
        created_at: now,
        updated_at: now,
        created_by: Some(actor.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::MemStore;

    fn record(id: &str, title: &str) -> String {
        format!(
            r#"{{"id":"{id}","title":"{title}","status":"open","priority":2,"issue_type":"task","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#
        )
    }

    fn record_with_dep(id: &str, title: &str, dep: &str) -> String {
        format!(
            r#"{{"id":"{id}","title":"{title}","status":"open","priority":2,"issue_type":"task","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z","dependencies":[{{"issue_id":"{id}","depends_on_id":"{dep}","type":"blocks","created_at":"2026-01-01T00:00:00Z"}}]}}"#
        )
    }

    fn run_import(store: &mut MemStore, content: &str, options: &ImportOptions) -> Result<ImportResult> {
        let cancel = CancelToken::new();
        ImportPipeline::new(store, &cancel).run(content, options)
    }

    #[test]
    fn three_record_end_to_end() {
        let mut store = MemStore::new();
        let options = ImportOptions::default();

        let batch = [
            record("bi-aaa", "First"),
            record("bi-bbb", "Second"),
            record("bi-ccc", "Third"),
        ]
        .join("\n");
        let result = run_import(&mut store, &batch, &options).unwrap();
        assert_eq!(result.created, 3);

        let edited = [
            record("bi-aaa", "First v2"),
            record("bi-bbb", "Second v2"),
            record("bi-ccc", "Third v2"),
        ]
        .join("\n");
        let result = run_import(&mut store, &edited, &options).unwrap();
        assert_eq!((result.created, result.updated, result.unchanged), (0, 3, 0));

        let result = run_import(&mut store, &edited, &options).unwrap();
        assert_eq!((result.created, result.updated, result.unchanged), (0, 0, 3));
    }

    #[test]
    fn malformed_line_is_fatal_with_line_number() {
        let mut store = MemStore::new();
        let batch = format!("{}\nnot json\n", record("bi-aaa", "Ok"));
        let err = run_import(&mut store, &batch, &ImportOptions::default()).unwrap_err();
        match err {
            BraidError::JsonlParse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other}"),
        }
        // Fatal means nothing was applied.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn invalid_record_skipped_unless_strict() {
        let mut store = MemStore::new();
        let batch = format!("{}\n{}", record("bi-aaa", "Ok"), record("bi-bbb", " "));

        let result = run_import(&mut store, &batch, &ImportOptions::default()).unwrap();
        assert_eq!((result.created, result.skipped), (1, 1));

        let mut store = MemStore::new();
        let strict = ImportOptions {
            strict: true,
            ..ImportOptions::default()
        };
        assert!(run_import(&mut store, &batch, &strict).is_err());
    }

    #[test]
    fn malformed_label_skipped_unless_strict() {
        let mut store = MemStore::new();
        let long = "x".repeat(80);
        let batch = format!(
            r#"{{"id":"bi-aaa","title":"Labelled","status":"open","priority":2,"issue_type":"task","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z","labels":["bad label, punctuated! {long}"]}}"#
        );

        let result = run_import(&mut store, &batch, &ImportOptions::default()).unwrap();
        assert_eq!((result.created, result.skipped), (0, 1));

        let mut store = MemStore::new();
        let strict = ImportOptions {
            strict: true,
            ..ImportOptions::default()
        };
        assert!(run_import(&mut store, &batch, &strict).is_err());
    }

    #[test]
    fn prefix_adopted_from_first_batch() {
        let mut store = MemStore::new();
        let batch = [record("proj-a1b", "A"), record("proj-c2d", "B")].join("\n");
        run_import(&mut store, &batch, &ImportOptions::default()).unwrap();
        assert_eq!(
            braid_core::MemStore::get_config(&store, "prefix"),
            Some("proj")
        );
    }

    #[test]
    fn foreign_prefix_renamed_with_references() {
        let mut store = MemStore::new();
        braid_core::MemStore::set_config(&mut store, "prefix", "bi");

        let batch = [
            record_with_dep("xx-abc", "Source", "xx-tgt"),
            record("xx-tgt", "Target"),
        ]
        .join("\n");

        let strict_err = run_import(&mut store, &batch, &ImportOptions::default()).unwrap_err();
        assert!(matches!(strict_err, BraidError::PrefixMismatch { .. }));

        let options = ImportOptions {
            rename_on_import: true,
            ..ImportOptions::default()
        };
        let result = run_import(&mut store, &batch, &options).unwrap();
        assert_eq!(result.created, 2);
        assert_eq!(result.remapped.len(), 2);

        let new_target = &result
            .remapped
            .iter()
            .find(|(old, _)| old == "xx-tgt")
            .unwrap()
            .1;
        let new_source = &result
            .remapped
            .iter()
            .find(|(old, _)| old == "xx-abc")
            .unwrap()
            .1;
        let source = braid_core::MemStore::get_issue(&store, new_source).unwrap();
        assert_eq!(&source.dependencies[0].depends_on_id, new_target);
    }

    #[test]
    fn orphan_policies() {
        let base = record_with_dep("bi-src", "Source", "bi-ghost");

        // allow (default): edge kept as-is
        let mut store = MemStore::new();
        let result = run_import(&mut store, &base, &ImportOptions::default()).unwrap();
        assert_eq!(result.created, 1);
        let source = braid_core::MemStore::get_issue(&store, "bi-src").unwrap();
        assert_eq!(source.dependencies.len(), 1);

        // skip: edge dropped and reported
        let mut store = MemStore::new();
        let options = ImportOptions {
            orphans: OrphanPolicy::Skip,
            ..ImportOptions::default()
        };
        let result = run_import(&mut store, &base, &options).unwrap();
        assert_eq!(
            result.skipped_dependencies,
            vec![("bi-src".to_string(), "bi-ghost".to_string())]
        );
        let source = braid_core::MemStore::get_issue(&store, "bi-src").unwrap();
        assert!(source.dependencies.is_empty());

        // resurrect: placeholder created
        let mut store = MemStore::new();
        let options = ImportOptions {
            orphans: OrphanPolicy::Resurrect,
            ..ImportOptions::default()
        };
        let result = run_import(&mut store, &base, &options).unwrap();
        assert_eq!(result.created, 2);
        assert!(braid_core::MemStore::id_exists(&store, "bi-ghost"));

        // strict: fatal
        let mut store = MemStore::new();
        let options = ImportOptions {
            orphans: OrphanPolicy::Strict,
            ..ImportOptions::default()
        };
        let err = run_import(&mut store, &base, &options).unwrap_err();
        assert!(matches!(err, BraidError::DependencyNotFound { .. }));
    }

    #[test]
    fn skip_existing_leaves_records_untouched() {
        let mut store = MemStore::new();
        run_import(&mut store, &record("bi-aaa", "Original"), &ImportOptions::default()).unwrap();

        let options = ImportOptions {
            skip_existing: true,
            ..ImportOptions::default()
        };
        let result = run_import(&mut store, &record("bi-aaa", "Changed"), &options).unwrap();
        assert_eq!((result.updated, result.skipped), (0, 1));
        assert_eq!(
            braid_core::MemStore::get_issue(&store, "bi-aaa").unwrap().title,
            "Original"
        );
    }

    #[test]
    fn dry_run_applies_nothing() {
        let mut store = MemStore::new();
        let options = ImportOptions {
            dry_run: true,
            ..ImportOptions::default()
        };
        let result = run_import(&mut store, &record("bi-aaa", "Preview"), &options).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.created, 1);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn whole_float_priority_accepted_and_unchanged() {
        let mut store = MemStore::new();
        run_import(&mut store, &record("bi-aaa", "Float me"), &ImportOptions::default()).unwrap();

        let float_version = record("bi-aaa", "Float me").replace(r#""priority":2"#, r#""priority":2.0"#);
        let result = run_import(&mut store, &float_version, &ImportOptions::default()).unwrap();
        assert_eq!((result.updated, result.unchanged), (0, 1));
    }

    #[test]
    fn collision_reported_then_remapped() {
        let mut store = MemStore::new();
        run_import(&mut store, &record("bi-aaa", "Original"), &ImportOptions::default()).unwrap();

        // Same id, different content, different provenance.
        let imposter = record("bi-aaa", "Different record")
            .replace("2026-01-01T00:00:00Z", "2026-02-02T00:00:00Z");
        let err = run_import(&mut store, &imposter, &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, BraidError::Collision { .. }));

        let options = ImportOptions {
            rename_on_import: true,
            ..ImportOptions::default()
        };
        let result = run_import(&mut store, &imposter, &options).unwrap();
        assert_eq!(result.collisions, 1);
        assert_eq!(result.created, 1);
        assert_eq!(
            braid_core::MemStore::get_issue(&store, "bi-aaa").unwrap().title,
            "Original"
        );
    }

    #[test]
    fn orphan_policy_parses_from_str() {
        assert_eq!("allow".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Allow);
        assert_eq!("STRICT".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Strict);
        assert!("bogus".parse::<OrphanPolicy>().is_err());
    }
}
