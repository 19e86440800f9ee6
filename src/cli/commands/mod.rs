//! Command implementations.
//!
//! Every command goes through a [`Session`]: discover the workspace,
//! open the cache (or the in-memory store in `--no-db` mode), and bring
//! the cache up to date with the log when their content hashes disagree.

pub mod close;
pub mod compact;
pub mod completions;
pub mod config;
pub mod create;
pub mod delete;
pub mod dep;
pub mod import;
pub mod init;
pub mod list;
pub mod show;
pub mod sync;
pub mod update;
pub mod version;

use std::fs;

use sha2::{Digest, Sha256};
use tracing::debug;

use braid_core::{MemStore, jsonl};

use crate::config::Workspace;
use crate::engine::CancelToken;
use crate::engine::import::{ImportOptions, ImportPipeline};
use crate::error::Result;
use crate::storage::{SqliteStorage, Storage};

/// An open workspace plus its storage backend.
pub struct Session {
    pub workspace: Workspace,
    pub store: Box<dyn Storage>,
    pub cancel: CancelToken,
}

impl Session {
    /// Discover the workspace from the current directory and open its
    /// storage. The cache is refreshed from the log when stale.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` outside a workspace, plus any storage or
    /// import failure.
    pub fn open(no_db_flag: bool) -> Result<Self> {
        let workspace = Workspace::discover(std::env::current_dir()?)?;
        Self::open_at(workspace, no_db_flag)
    }

    pub fn open_at(workspace: Workspace, no_db_flag: bool) -> Result<Self> {
        let cancel = CancelToken::new();
        let no_db = no_db_flag || workspace.no_db();
        let store: Box<dyn Storage> = if no_db {
            debug!("JSONL-only mode; skipping the cache");
            Box::new(open_memory(&workspace)?)
        } else {
            Box::new(SqliteStorage::open(workspace.cache_path())?)
        };
        let mut session = Self {
            workspace,
            store,
            cancel,
        };
        session.refresh_from_log()?;
        Ok(session)
    }

    /// Re-import the log when its content hash differs from the one
    /// recorded at the last import. A crash between export and metadata
    /// update is safe: the re-import classifies everything unchanged.
    fn refresh_from_log(&mut self) -> Result<()> {
        let path = self.workspace.issues_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
        if self.store.get_metadata("last_import_hash")? == Some(digest) {
            return Ok(());
        }
        debug!("log changed since last import; refreshing cache");
        let options = ImportOptions {
            actor: self.workspace.actor(),
            ..ImportOptions::default()
        };
        ImportPipeline::new(self.store.as_mut(), &self.cancel).run(&content, &options)?;
        self.store.clear_dirty()?;
        Ok(())
    }

    /// Export pending changes back to the log.
    ///
    /// # Errors
    ///
    /// Fails when the export cannot be written.
    pub fn flush(&mut self) -> Result<()> {
        if self.store.dirty_count()? == 0 {
            return Ok(());
        }
        let issues = self.store.export_issues()?;
        jsonl::save(&self.workspace.issues_path(), &issues)?;
        let content = fs::read_to_string(self.workspace.issues_path())?;
        let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
        self.store.set_metadata("last_import_hash", &digest)?;
        self.store.clear_dirty()?;
        Ok(())
    }

    pub fn actor(&self) -> String {
        self.workspace.actor()
    }
}

fn open_memory(workspace: &Workspace) -> Result<MemStore> {
    let path = workspace.issues_path();
    if path.exists() {
        MemStore::open(&path)
    } else {
        Ok(MemStore::new())
    }
}

/// Pretty-print any serializable value as JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
