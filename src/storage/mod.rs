//! Storage layer.
//!
//! The engine consumes storage through the [`Storage`] trait so the same
//! pipelines run against the `SQLite` cache or, in `--no-db` mode, the
//! in-memory store from `braid-core`. The cache is disposable; anything in
//! it can be rebuilt from the JSONL log.

pub mod sqlite;

pub use sqlite::SqliteStorage;

use braid_core::model::{Comment, DependencyType, Issue};
use braid_core::update::{IssueUpdate, ListFilters};
use braid_core::{MemStore, Result};

/// CRUD + query capability the reconciliation engine is written against.
pub trait Storage: Send {
    fn create_issue(&mut self, issue: &Issue, actor: &str) -> Result<Issue>;
    fn update_issue(&mut self, id: &str, update: &IssueUpdate, actor: &str) -> Result<Issue>;
    fn tombstone_issue(&mut self, id: &str, actor: &str, reason: Option<String>) -> Result<()>;
    /// Insert or replace a record exactly as given (import path). Marks
    /// the record dirty.
    fn put_imported(&mut self, issue: Issue) -> Result<()>;
    /// Drop a record from the cache entirely (post-prune cleanup). Not a
    /// user-facing deletion; that is `tombstone_issue`.
    fn remove_issue(&mut self, id: &str) -> Result<()>;
    fn get_issue(&self, id: &str) -> Result<Issue>;
    fn id_exists(&self, id: &str) -> Result<bool>;
    fn list_issues(&self, filters: &ListFilters) -> Result<Vec<Issue>>;
    fn resolve_id(&self, input: &str) -> Result<String>;
    /// All issues sorted by ID, the canonical export order of the log.
    fn export_issues(&self) -> Result<Vec<Issue>>;
    fn issue_count(&self) -> Result<usize>;

    /// Add a dependency edge. `require_target` selects whether a missing
    /// target is an error or accepted (the "allow" orphan policy).
    fn add_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        created_by: Option<&str>,
        require_target: bool,
    ) -> Result<()>;
    fn remove_dependency(&mut self, issue_id: &str, depends_on_id: &str) -> Result<()>;
    fn find_cycles(&self) -> Result<Vec<Vec<String>>>;

    fn add_label(&mut self, issue_id: &str, label: &str) -> Result<()>;
    fn add_comment(&mut self, issue_id: &str, author: &str, body: &str) -> Result<Comment>;

    fn get_config(&self, key: &str) -> Result<Option<String>>;
    fn set_config(&mut self, key: &str, value: &str) -> Result<()>;
    fn get_metadata(&self, key: &str) -> Result<Option<String>>;
    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()>;

    fn is_dirty(&self) -> Result<bool>;
    fn dirty_count(&self) -> Result<usize>;
    fn clear_dirty(&mut self) -> Result<()>;
}

impl Storage for MemStore {
    fn create_issue(&mut self, issue: &Issue, actor: &str) -> Result<Issue> {
        Self::create_issue(self, issue, actor)
    }

    fn update_issue(&mut self, id: &str, update: &IssueUpdate, actor: &str) -> Result<Issue> {
        Self::update_issue(self, id, update, actor)
    }

    fn tombstone_issue(&mut self, id: &str, actor: &str, reason: Option<String>) -> Result<()> {
        Self::tombstone_issue(self, id, actor, reason)
    }

    fn put_imported(&mut self, issue: Issue) -> Result<()> {
        Self::put_imported(self, issue);
        Ok(())
    }

    fn remove_issue(&mut self, id: &str) -> Result<()> {
        Self::remove_issue(self, id);
        Ok(())
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        Self::get_issue(self, id).cloned()
    }

    fn id_exists(&self, id: &str) -> Result<bool> {
        Ok(Self::id_exists(self, id))
    }

    fn list_issues(&self, filters: &ListFilters) -> Result<Vec<Issue>> {
        Ok(Self::list_issues(self, filters)
            .into_iter()
            .cloned()
            .collect())
    }

    fn resolve_id(&self, input: &str) -> Result<String> {
        Self::resolve_id(self, input)
    }

    fn export_issues(&self) -> Result<Vec<Issue>> {
        Ok(Self::export_issues(self))
    }

    fn issue_count(&self) -> Result<usize> {
        Ok(self.len())
    }

    fn add_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        created_by: Option<&str>,
        require_target: bool,
    ) -> Result<()> {
        if require_target {
            Self::add_dependency(
                self,
                issue_id,
                depends_on_id,
                dep_type,
                created_by.unwrap_or("unknown"),
            )
        } else {
            self.add_dependency_unchecked_target(issue_id, depends_on_id, dep_type, created_by)
        }
    }

    fn remove_dependency(&mut self, issue_id: &str, depends_on_id: &str) -> Result<()> {
        Self::remove_dependency(self, issue_id, depends_on_id)
    }

    fn find_cycles(&self) -> Result<Vec<Vec<String>>> {
        Ok(Self::find_cycles(self))
    }

    fn add_label(&mut self, issue_id: &str, label: &str) -> Result<()> {
        Self::add_label(self, issue_id, label)
    }

    fn add_comment(&mut self, issue_id: &str, author: &str, body: &str) -> Result<Comment> {
        Self::add_comment(self, issue_id, author, body)
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        Ok(Self::get_config(self, key).map(String::from))
    }

    fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        Self::set_config(self, key, value);
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(Self::get_metadata(self, key).map(String::from))
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        Self::set_metadata(self, key, value);
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(Self::is_dirty(self))
    }

    fn dirty_count(&self) -> Result<usize> {
        Ok(Self::dirty_count(self))
    }

    fn clear_dirty(&mut self) -> Result<()> {
        Self::clear_dirty(self);
        Ok(())
    }
}
