//! `braid` - Git-native issue tracker
//!
//! The JSONL log committed to git is the source of truth; a local `SQLite`
//! cache serves queries. The reconciliation engine in [`engine`] keeps the
//! two in step across machines, branches, and concurrent writers.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Workspace discovery and YAML configuration
//! - [`engine`] - Import, merge, sync, tombstone pruning, background flush
//! - [`error`] - Error types shared with `braid-core`
//! - [`format`] - Output formatting (text, JSON)
//! - [`logging`] - Tracing subscriber setup
//! - [`storage`] - `SQLite` cache layer
//! - [`validation`] - Record validation rules

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod storage;
pub mod validation;

pub use error::{BraidError, Result};

/// Run the CLI application.
///
/// # Errors
///
/// Returns an error if command execution fails.
pub fn run() -> Result<()> {
    cli::run()
}
