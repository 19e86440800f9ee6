//! Error taxonomy for braid.
//!
//! One consolidated enum for the whole workspace. Messages that reach a
//! user always name the record involved and, where a follow-up action
//! exists, spell it out; raw storage-engine text never escapes this module.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for braid operations.
#[derive(Error, Debug)]
pub enum BraidError {
    // === Record errors ===
    /// Issue with the specified ID was not found.
    #[error("issue not found: {id}")]
    IssueNotFound { id: String },

    /// Attempted to create an issue with an ID that already exists.
    #[error("issue ID already exists: {id}")]
    IdCollision { id: String },

    /// Issue ID format is invalid.
    #[error("invalid issue ID format: {id}")]
    InvalidId { id: String },

    // === Validation errors ===
    /// Single-field validation failure. Skippable during import unless
    /// strict mode is requested.
    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Multiple validation errors on one record.
    #[error("validation errors: {errors:?}")]
    ValidationErrors { errors: Vec<ValidationError> },

    #[error("invalid status: {status}")]
    InvalidStatus { status: String },

    #[error("invalid issue type: {issue_type}")]
    InvalidType { issue_type: String },

    #[error("priority must be 0-4, got: {priority}")]
    InvalidPriority { priority: i32 },

    // === Log (JSONL) errors ===
    /// Malformed line in the log. Fatal for the whole batch; there is no
    /// partial-line recovery.
    #[error("malformed JSONL at line {line}: {reason}")]
    JsonlParse { line: usize, reason: String },

    /// Incoming records carry identifiers with divergent content.
    /// `ids` lists every colliding identifier in the batch.
    #[error(
        "identifier collision on {} record(s): {}; re-run with --rename-on-import to remap, or resolve manually",
        ids.len(),
        ids.join(", ")
    )]
    Collision { ids: Vec<String> },

    /// Batch contains identifiers under prefixes other than the configured
    /// one. `counts` is (prefix, record count), one entry per foreign prefix.
    #[error(
        "prefix mismatch: expected '{expected}', found {}; re-run with --rename-on-import to adopt the configured prefix",
        counts.iter().map(|(p, n)| format!("'{p}' ({n})")).collect::<Vec<_>>().join(", ")
    )]
    PrefixMismatch {
        expected: String,
        counts: Vec<(String, usize)>,
    },

    /// Duplicate external references across incoming records.
    #[error(
        "duplicate external_ref '{external_ref}' on {} record(s); re-run with --clear-duplicate-external-refs to keep the first and clear the rest",
        ids.len()
    )]
    DuplicateExternalRef {
        external_ref: String,
        ids: Vec<String>,
    },

    // === Dependency errors ===
    /// Adding the dependency would close a blocking cycle.
    #[error("cycle detected in dependencies: {path}")]
    DependencyCycle { path: String },

    #[error("issue cannot depend on itself: {id}")]
    SelfDependency { id: String },

    /// Dependency target is missing from both the batch and the store.
    #[error("dependency target not found: {id}")]
    DependencyNotFound { id: String },

    #[error("dependency already exists: {from} -> {to}")]
    DuplicateDependency { from: String, to: String },

    // === Merge / sync errors ===
    /// Automatic three-way merge left unresolved records. Terminal failure
    /// of auto-merge; the user has to pick a side.
    #[error(
        "automatic merge could not resolve {remaining} record(s); accept one side with:\n  git checkout --ours {path} && git add {path}   (keep local)\n  git checkout --theirs {path} && git add {path}  (keep remote)"
    )]
    MergeConflict { remaining: usize, path: String },

    /// Local and remote sync-branch tips are mutual non-ancestors, most
    /// likely a forced push on the remote. Never auto-resolved.
    #[error(
        "sync branch '{branch}' has diverged from {remote} (likely a forced push); inspect with 'git log {branch}..{remote}/{branch}' before syncing again"
    )]
    Divergence { branch: String, remote: String },

    /// A git subprocess failed.
    #[error("git {op} failed: {message}")]
    Git { op: String, message: String },

    // === Configuration / workspace ===
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no braid workspace found; run 'braid init' first")]
    NotInitialized,

    #[error("braid workspace already initialized at {path}; use --force to reinitialize")]
    AlreadyInitialized { path: PathBuf },

    // === Storage / I/O ===
    /// Storage-layer failure with engine details already scrubbed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Operational ===
    #[error("nothing to do: {reason}")]
    NothingToDo { reason: String },

    /// Background export failed; the worker will retry next cycle.
    #[error("flush failed: {0}")]
    Flush(String),

    /// Operation cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

/// A single field validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl BraidError {
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn from_validation_errors(errors: Vec<ValidationError>) -> Self {
        if errors.len() == 1 {
            let err = &errors[0];
            Self::Validation {
                field: err.field.clone(),
                reason: err.message.clone(),
            }
        } else {
            Self::ValidationErrors { errors }
        }
    }

    /// True when the error is fatal for a whole import batch rather than
    /// skippable per record.
    #[must_use]
    pub const fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::JsonlParse { .. }
                | Self::Collision { .. }
                | Self::PrefixMismatch { .. }
                | Self::MergeConflict { .. }
        )
    }
}

/// Result type using `BraidError`.
pub type Result<T> = std::result::Result<T, BraidError>;
