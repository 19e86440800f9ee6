//! Reconciliation engine.
//!
//! Keeps the git-tracked JSONL log and the local cache consistent:
//!
//! - [`diff`] - semantic change detection with type-tolerant equality
//! - [`collision`] - identifier collision and prefix resolution
//! - [`import`] - parse / validate / diff / resolve / apply / finalize
//! - [`merge`] - conflict-marker detection and three-way record merge
//! - [`git`] - subprocess layer for the version-control capability
//! - [`sync`] - branch-based push/pull with divergence detection
//! - [`tombstone`] - soft-delete pruning with TTL
//! - [`flush`] - debounced background export

pub mod collision;
pub mod diff;
pub mod flush;
pub mod git;
pub mod import;
pub mod merge;
pub mod sync;
pub mod tombstone;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use braid_core::error::{BraidError, Result};

/// Cooperative cancellation flag shared between the foreground thread and
/// anything it spawned. Cancelling kills in-flight subprocesses; files
/// already written stay written.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// # Errors
    ///
    /// Returns `Cancelled` once the token has been tripped.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BraidError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trips_once() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(BraidError::Cancelled)));
        // Clones share the flag.
        assert!(token.clone().is_cancelled());
    }
}
