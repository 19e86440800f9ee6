//! Content hashing and ID generation.
//!
//! IDs are `<prefix>-<base36 hash>` with the hash length chosen from the
//! current store size so that the collision probability stays below 25%.
//! The content hash is a SHA-256 digest over the semantic fields only;
//! timestamps and relations are excluded so that re-imports of unchanged
//! records hash identically.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::model::Issue;

// ============================================================================
// ID generation
// ============================================================================

/// Generate a unique issue ID with the given prefix.
///
/// The `exists` closure reports collisions against the current store.
pub fn generate_id<F>(
    prefix: &str,
    title: &str,
    description: Option<&str>,
    creator: Option<&str>,
    created_at: DateTime<Utc>,
    issue_count: usize,
    mut exists: F,
) -> String
where
    F: FnMut(&str) -> bool,
{
    let mut length = optimal_hash_length(issue_count);

    loop {
        for nonce in 0..10 {
            let seed = id_seed(title, description, creator, created_at, nonce);
            let id = format!("{prefix}-{}", base36_digest(&seed, length));
            if !exists(&id) {
                return id;
            }
        }

        if length < 8 {
            length += 1;
        } else {
            // Every short candidate collided; walk nonces at full length.
            let mut nonce = 0u32;
            loop {
                let seed = id_seed(title, description, creator, created_at, nonce);
                let id = format!("{prefix}-{}", base36_digest(&seed, 12));
                if !exists(&id) {
                    return id;
                }
                nonce += 1;
                if nonce > 1000 {
                    return format!("{prefix}-{}{nonce}", base36_digest(&seed, 12));
                }
            }
        }
    }
}

/// Birthday-bound hash length for a store of `issue_count` records.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn optimal_hash_length(issue_count: usize) -> usize {
    let n = issue_count as f64;
    let max_prob = 0.25;

    for (len, exp) in [(3_usize, 3_i32), (4, 4), (5, 5), (6, 6), (7, 7), (8, 8)] {
        let space = 36_f64.powi(exp);
        // P(collision) ~ 1 - e^(-n^2 / 2d)
        let prob = 1.0 - (-n * n / (2.0 * space)).exp();
        if prob < max_prob {
            return len;
        }
    }
    8
}

fn id_seed(
    title: &str,
    description: Option<&str>,
    creator: Option<&str>,
    created_at: DateTime<Utc>,
    nonce: u32,
) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        title,
        description.unwrap_or(""),
        creator.unwrap_or(""),
        created_at.timestamp_nanos_opt().unwrap_or(0),
        nonce
    )
}

fn base36_digest(input: &str, length: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();

    let mut num = 0u64;
    for &byte in result.iter().take(8) {
        num = (num << 8) | u64::from(byte);
    }

    let mut encoded = base36_encode(num);
    if encoded.len() < length {
        encoded = format!("{encoded:0>length$}");
    }
    encoded.chars().take(length).collect()
}

fn base36_encode(mut num: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if num == 0 {
        return "0".to_string();
    }
    let mut chars = Vec::new();
    while num > 0 {
        chars.push(ALPHABET[(num % 36) as usize] as char);
        num /= 36;
    }
    chars.into_iter().rev().collect()
}

/// Split an ID into (prefix, suffix) at the last dash.
#[must_use]
pub fn split_id(id: &str) -> Option<(&str, &str)> {
    let pos = id.rfind('-')?;
    let (prefix, rest) = id.split_at(pos);
    if prefix.is_empty() || rest.len() <= 1 {
        return None;
    }
    Some((prefix, &rest[1..]))
}

// ============================================================================
// Content hashing
// ============================================================================

/// Compute the SHA-256 content hash for an issue.
///
/// Covered, null-separated and in stable order: title, description, design,
/// acceptance_criteria, notes, status, `P{n}` priority, type, assignee,
/// created_by, external_ref, source_system.
///
/// Excluded: id, timestamps, tombstone metadata, labels, dependencies,
/// comments.
#[must_use]
pub fn content_hash(issue: &Issue) -> String {
    let mut hasher = Sha256::new();

    let mut field = |value: &str| {
        if value.contains('\0') {
            hasher.update(value.replace('\0', " ").as_bytes());
        } else {
            hasher.update(value.as_bytes());
        }
        hasher.update(b"\x00");
    };

    field(&issue.title);
    field(issue.description.as_deref().unwrap_or(""));
    field(issue.design.as_deref().unwrap_or(""));
    field(issue.acceptance_criteria.as_deref().unwrap_or(""));
    field(issue.notes.as_deref().unwrap_or(""));
    field(issue.status.as_str());
    field(&format!("P{}", issue.priority.0));
    field(issue.issue_type.as_str());
    field(issue.assignee.as_deref().unwrap_or(""));
    field(issue.created_by.as_deref().unwrap_or(""));
    field(issue.external_ref.as_deref().unwrap_or(""));
    field(issue.source_system.as_deref().unwrap_or(""));

    format!("{:x}", hasher.finalize())
}
