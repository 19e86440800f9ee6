//! Collision and prefix resolution.
//!
//! Partitions an incoming batch against the store, detects identifier
//! collisions and foreign prefixes, and rewrites identifiers with
//! reference integrity: structural references (dependency edges, comment
//! parents) and textual mentions inside free-text fields both follow the
//! record to its new identifier.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::model::Issue;

/// What to do when an incoming identifier already exists with different
/// content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionStrategy {
    /// Abort the whole import, reporting every colliding identifier.
    #[default]
    Strict,
    /// Assign fresh identifiers and rewrite references.
    Remap,
}

/// What to do when two records carry the same external reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateRefPolicy {
    #[default]
    Fail,
    /// Keep the first occurrence, clear the rest.
    ClearDuplicates,
}

/// Per-record classification of a batch against the store.
#[derive(Debug, Default)]
pub struct Partition {
    pub create: Vec<Issue>,
    pub update: Vec<Issue>,
    pub unchanged: Vec<Issue>,
    /// Same identifier, different content, different provenance.
    pub collide: Vec<Issue>,
}

/// Classify each incoming record against what the store already holds.
///
/// Same identifier with an equal content hash is `unchanged`. A different
/// hash with the same creation timestamp is the same record edited, so
/// `update`. A different creation timestamp means two distinct records
/// landed on one identifier, which is a collision.
pub fn partition<F>(batch: Vec<Issue>, mut lookup: F) -> Result<Partition>
where
    F: FnMut(&str) -> Result<Option<Issue>>,
{
    let mut result = Partition::default();
    for mut incoming in batch {
        incoming.content_hash = Some(incoming.compute_content_hash());
        match lookup(&incoming.id)? {
            None => result.create.push(incoming),
            Some(existing) => {
                if existing.content_hash == incoming.content_hash {
                    result.unchanged.push(incoming);
                } else if existing.created_at == incoming.created_at {
                    result.update.push(incoming);
                } else {
                    result.collide.push(incoming);
                }
            }
        }
    }
    Ok(result)
}

/// Resolve collisions per the chosen strategy.
///
/// Strict reports every colliding identifier and changes nothing. Remap
/// mints fresh identifiers under the same prefix and rewrites the whole
/// batch, returning the old -> new mapping.
///
/// # Errors
///
/// Returns `Collision` under the strict strategy.
pub fn resolve<F>(
    batch: &mut [Issue],
    colliding: &[Issue],
    strategy: CollisionStrategy,
    mut exists: F,
) -> Result<Vec<(String, String)>>
where
    F: FnMut(&str) -> bool,
{
    if colliding.is_empty() {
        return Ok(Vec::new());
    }
    match strategy {
        CollisionStrategy::Strict => Err(BraidError::Collision {
            ids: colliding.iter().map(|i| i.id.clone()).collect(),
        }),
        CollisionStrategy::Remap => {
            let batch_ids: HashSet<String> = batch.iter().map(|i| i.id.clone()).collect();
            let mut mapping = Vec::new();
            for issue in colliding {
                let prefix = braid_core::hash::split_id(&issue.id)
                    .map_or("bi", |(p, _)| p)
                    .to_string();
                let new_id = fresh_id(&prefix, issue, |candidate| {
                    exists(candidate) || batch_ids.contains(candidate)
                });
                debug!(old = %issue.id, new = %new_id, "remapping collided identifier");
                mapping.push((issue.id.clone(), new_id));
            }
            apply_renames(batch, &mapping);
            Ok(mapping)
        }
    }
}

/// Check the batch against the configured namespace prefix.
///
/// Without `rename`, any foreign prefix fails closed with per-prefix
/// counts. With it, every mismatched identifier is renamed under the
/// configured prefix and the mapping returned.
///
/// # Errors
///
/// Returns `PrefixMismatch` when foreign prefixes exist and `rename` is
/// off.
pub fn enforce_prefix<F>(
    batch: &mut [Issue],
    expected: &str,
    rename: bool,
    mut exists: F,
) -> Result<Vec<(String, String)>>
where
    F: FnMut(&str) -> bool,
{
    let mut foreign: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for issue in batch.iter() {
        if let Some((prefix, _)) = braid_core::hash::split_id(&issue.id) {
            if prefix != expected {
                foreign.push(issue.id.clone());
                *counts.entry(prefix.to_string()).or_insert(0) += 1;
            }
        }
    }
    if foreign.is_empty() {
        return Ok(Vec::new());
    }
    if !rename {
        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        counts.sort();
        return Err(BraidError::PrefixMismatch {
            expected: expected.to_string(),
            counts,
        });
    }

    let batch_ids: HashSet<String> = batch.iter().map(|i| i.id.clone()).collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut mapping = Vec::new();
    for old_id in foreign {
        let issue = batch
            .iter()
            .find(|i| i.id == old_id)
            .cloned()
            .unwrap_or_default();
        let new_id = fresh_id(expected, &issue, |candidate| {
            exists(candidate) || batch_ids.contains(candidate) || taken.contains(candidate)
        });
        taken.insert(new_id.clone());
        mapping.push((old_id, new_id));
    }
    apply_renames(batch, &mapping);
    Ok(mapping)
}

fn fresh_id<F>(prefix: &str, issue: &Issue, exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    braid_core::hash::generate_id(
        prefix,
        &issue.title,
        issue.description.as_deref(),
        issue.created_by.as_deref(),
        Utc::now(),
        0,
        exists,
    )
}

/// Apply an old -> new identifier mapping across the whole batch:
/// record identifiers, dependency edges, comment parents, and textual
/// mentions inside free-text fields.
pub fn apply_renames(batch: &mut [Issue], mapping: &[(String, String)]) {
    if mapping.is_empty() {
        return;
    }
    // Longest first so "xx-abc12" never swallows a mention of "xx-abc123".
    let mut ordered: Vec<&(String, String)> = mapping.iter().collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
    let map: HashMap<&str, &str> = mapping
        .iter()
        .map(|(old, new)| (old.as_str(), new.as_str()))
        .collect();

    for issue in batch.iter_mut() {
        if let Some(new_id) = map.get(issue.id.as_str()) {
            issue.id = (*new_id).to_string();
        }
        for dep in &mut issue.dependencies {
            if let Some(new_id) = map.get(dep.issue_id.as_str()) {
                dep.issue_id = (*new_id).to_string();
            }
            if let Some(new_id) = map.get(dep.depends_on_id.as_str()) {
                dep.depends_on_id = (*new_id).to_string();
            }
        }
        for comment in &mut issue.comments {
            if let Some(new_id) = map.get(comment.issue_id.as_str()) {
                comment.issue_id = (*new_id).to_string();
            }
            comment.body = rewrite_mentions(&comment.body, &ordered);
        }
        issue.title = rewrite_mentions(&issue.title, &ordered);
        if let Some(text) = issue.description.take() {
            issue.description = Some(rewrite_mentions(&text, &ordered));
        }
        if let Some(text) = issue.design.take() {
            issue.design = Some(rewrite_mentions(&text, &ordered));
        }
        if let Some(text) = issue.acceptance_criteria.take() {
            issue.acceptance_criteria = Some(rewrite_mentions(&text, &ordered));
        }
        if let Some(text) = issue.notes.take() {
            issue.notes = Some(rewrite_mentions(&text, &ordered));
        }
    }
}

/// Replace identifier mentions in free text, respecting word boundaries:
/// a match is only rewritten when the surrounding characters cannot be
/// part of an identifier.
fn rewrite_mentions(text: &str, ordered: &[&(String, String)]) -> String {
    let mut result = text.to_string();
    for (old, new) in ordered {
        result = rewrite_one(&result, old, new);
    }
    result
}

fn rewrite_one(text: &str, old: &str, new: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(old) {
        let before = if pos == 0 {
            out.chars().next_back()
        } else {
            rest[..pos].chars().next_back()
        };
        let before_ok = !before.is_some_and(is_id_char);
        let after = &rest[pos + old.len()..];
        let after_ok = !after.chars().next().is_some_and(is_id_char);

        out.push_str(&rest[..pos]);
        if before_ok && after_ok {
            out.push_str(new);
        } else {
            out.push_str(old);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Enforce external-reference uniqueness across the batch.
///
/// # Errors
///
/// Returns `DuplicateExternalRef` under the fail policy.
pub fn check_external_refs(batch: &mut [Issue], policy: DuplicateRefPolicy) -> Result<()> {
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    for issue in batch.iter() {
        if let Some(ext) = &issue.external_ref {
            seen.entry(ext.clone()).or_default().push(issue.id.clone());
        }
    }
    let mut duplicated: Vec<(String, Vec<String>)> = seen
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .collect();
    if duplicated.is_empty() {
        return Ok(());
    }
    duplicated.sort();

    match policy {
        DuplicateRefPolicy::Fail => {
            let (external_ref, ids) = duplicated.remove(0);
            Err(BraidError::DuplicateExternalRef { external_ref, ids })
        }
        DuplicateRefPolicy::ClearDuplicates => {
            for (external_ref, ids) in duplicated {
                for id in ids.iter().skip(1) {
                    if let Some(issue) = batch.iter_mut().find(|i| i.id == *id) {
                        issue.external_ref = None;
                    }
                }
                debug!(external_ref, "cleared duplicate external references");
            }
            Ok(())
        }
    }
}
