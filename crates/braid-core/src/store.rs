//! In-memory issue store.
//!
//! The whole log lives in memory as `id -> Issue` with relations embedded
//! on each issue. Used directly in `--no-db` mode and as the substrate for
//! merge work; the SQLite cache in the binary crate mirrors this API.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{BraidError, Result};
use crate::jsonl;
use crate::model::{Comment, Dependency, DependencyType, Issue};
use crate::update::{IssueUpdate, ListFilters};

/// Default ID prefix for fresh workspaces.
pub const DEFAULT_PREFIX: &str = "bi";

pub struct MemStore {
    issues: HashMap<String, Issue>,
    dirty_ids: HashSet<String>,
    config: HashMap<String, String>,
    metadata: HashMap<String, String>,
    jsonl_path: Option<PathBuf>,
    next_comment_id: i64,
    prefix: String,
}

impl MemStore {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[must_use]
    pub fn new() -> Self {
        Self {
            issues: HashMap::new(),
            dirty_ids: HashSet::new(),
            config: HashMap::new(),
            metadata: HashMap::new(),
            jsonl_path: None,
            next_comment_id: 1,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Open and load from a JSONL file.
    ///
    /// Content hashes are recomputed on load; the log never carries them.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loaded = jsonl::load(path)?;

        let mut store = Self::new();
        store.jsonl_path = Some(path.to_path_buf());

        for mut issue in loaded {
            for c in &issue.comments {
                if c.id >= store.next_comment_id {
                    store.next_comment_id = c.id + 1;
                }
            }
            issue.content_hash = Some(issue.compute_content_hash());
            store.issues.insert(issue.id.clone(), issue);
        }

        if let Some(prefix) = store.detect_prefix() {
            store.prefix = prefix;
        }

        Ok(store)
    }

    /// Most common prefix across loaded issue IDs, ties broken
    /// alphabetically.
    #[must_use]
    pub fn detect_prefix(&self) -> Option<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in self.issues.keys() {
            if let Some((prefix, _)) = crate::hash::split_id(id) {
                *counts.entry(prefix).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
            .map(|(p, _)| p.to_string())
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Save back to the file this store was opened from.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if no path is set, or `Io` on write failure.
    pub fn save(&self) -> Result<()> {
        let path = self
            .jsonl_path
            .as_ref()
            .ok_or_else(|| BraidError::Storage("no file path set; use save_to()".to_string()))?;
        self.save_to(path.clone())
    }

    /// Save to a specific path, sorted by ID for deterministic output.
    ///
    /// # Errors
    ///
    /// Returns `Io` on write failure.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        jsonl::save(path.as_ref(), &self.export_issues())
    }

    /// All issues sorted by ID (the export order of the log).
    #[must_use]
    pub fn export_issues(&self) -> Vec<Issue> {
        let mut issues: Vec<Issue> = self.issues.values().cloned().collect();
        issues.sort_by(|a, b| a.id.cmp(&b.id));
        issues
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Create a new issue. If `issue.id` is empty, an ID is generated.
    ///
    /// # Errors
    ///
    /// Returns `IdCollision` if the ID already exists, or `Validation` if
    /// the title is empty.
    pub fn create_issue(&mut self, issue: &Issue, actor: &str) -> Result<Issue> {
        if issue.title.trim().is_empty() {
            return Err(BraidError::validation("title", "cannot be empty"));
        }

        let mut new_issue = issue.clone();
        let now = Utc::now();

        if new_issue.id.is_empty() {
            new_issue.id = crate::hash::generate_id(
                &self.prefix,
                &new_issue.title,
                new_issue.description.as_deref(),
                new_issue.created_by.as_deref().or(Some(actor)),
                now,
                self.issues.len(),
                |id| self.issues.contains_key(id),
            );
        } else if self.issues.contains_key(&new_issue.id) {
            return Err(BraidError::IdCollision {
                id: new_issue.id.clone(),
            });
        }

        new_issue.created_at = now;
        new_issue.updated_at = now;
        if new_issue.created_by.is_none() {
            new_issue.created_by = Some(actor.to_string());
        }
        new_issue.content_hash = Some(new_issue.compute_content_hash());

        let id = new_issue.id.clone();
        self.issues.insert(id.clone(), new_issue.clone());
        self.dirty_ids.insert(id);

        Ok(new_issue)
    }

    /// Apply a field update.
    ///
    /// `updated_at` and the content hash move only when a semantic field
    /// actually changed; a no-op update leaves both untouched, which is
    /// what keeps re-imports idempotent.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `Validation`.
    pub fn update_issue(&mut self, id: &str, update: &IssueUpdate, _actor: &str) -> Result<Issue> {
        let issue = self
            .issues
            .get_mut(id)
            .ok_or_else(|| BraidError::IssueNotFound { id: id.to_string() })?;

        if let Some(ref title) = update.title {
            if title.trim().is_empty() {
                return Err(BraidError::validation("title", "cannot be empty"));
            }
        }

        let old_hash = issue.content_hash.clone();
        let now = Utc::now();
        update.apply(issue, now);

        let new_hash = issue.compute_content_hash();
        if old_hash.as_deref() != Some(new_hash.as_str()) {
            issue.updated_at = now;
            issue.content_hash = Some(new_hash);
            self.dirty_ids.insert(id.to_string());
        }

        Ok(self.issues[id].clone())
    }

    /// Soft-delete: convert the issue to tombstone form in place.
    ///
    /// Hard removal only ever happens through pruning.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound`.
    pub fn tombstone_issue(&mut self, id: &str, actor: &str, reason: Option<String>) -> Result<()> {
        let issue = self
            .issues
            .remove(id)
            .ok_or_else(|| BraidError::IssueNotFound { id: id.to_string() })?;

        let mut ts = issue.into_tombstone(actor, reason);
        ts.updated_at = Utc::now();
        ts.content_hash = Some(ts.compute_content_hash());
        self.issues.insert(id.to_string(), ts);
        self.dirty_ids.insert(id.to_string());
        Ok(())
    }

    /// Insert or replace a record exactly as given (import path).
    ///
    /// Timestamps and authorship are taken from the record, not the clock.
    pub fn put_imported(&mut self, mut issue: Issue) {
        issue.content_hash = Some(issue.compute_content_hash());
        for c in &issue.comments {
            if c.id >= self.next_comment_id {
                self.next_comment_id = c.id + 1;
            }
        }
        self.dirty_ids.insert(issue.id.clone());
        self.issues.insert(issue.id.clone(), issue);
    }

    /// Drop a record outright, without a tombstone. Used after pruning
    /// the log so the store does not resurrect expired entries.
    pub fn remove_issue(&mut self, id: &str) {
        self.issues.remove(id);
        self.dirty_ids.remove(id);
    }

    /// # Errors
    ///
    /// Returns `IssueNotFound`.
    pub fn get_issue(&self, id: &str) -> Result<&Issue> {
        self.issues
            .get(id)
            .ok_or_else(|| BraidError::IssueNotFound { id: id.to_string() })
    }

    #[must_use]
    pub fn id_exists(&self, id: &str) -> bool {
        self.issues.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn list_issues(&self, filters: &ListFilters) -> Vec<&Issue> {
        let mut results: Vec<&Issue> = self
            .issues
            .values()
            .filter(|issue| filters.matches(issue))
            .collect();

        results.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        if let Some(limit) = filters.limit {
            results.truncate(limit);
        }
        results
    }

    /// Resolve a partial ID: exact, then prefix-normalized, then substring
    /// match on the hash portion.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `InvalidId`.
    pub fn resolve_id(&self, input: &str) -> Result<String> {
        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(BraidError::InvalidId { id: String::new() });
        }

        if self.issues.contains_key(&input) {
            return Ok(input);
        }

        if !input.contains('-') {
            let with_prefix = format!("{}-{}", self.prefix, input);
            if self.issues.contains_key(&with_prefix) {
                return Ok(with_prefix);
            }
        }

        let pattern = input
            .rfind('-')
            .map_or(input.as_str(), |pos| &input[pos + 1..]);

        let mut matches: Vec<String> = self
            .issues
            .keys()
            .filter(|id| {
                crate::hash::split_id(id).is_some_and(|(_, suffix)| suffix.contains(pattern))
            })
            .cloned()
            .collect();

        if matches.len() == 1 {
            return Ok(matches.remove(0));
        }

        Err(BraidError::IssueNotFound { id: input })
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Add a dependency edge with full integrity checks.
    ///
    /// # Errors
    ///
    /// Returns `SelfDependency`, `IssueNotFound`, `DependencyNotFound`,
    /// `DuplicateDependency`, or `DependencyCycle`.
    pub fn add_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        actor: &str,
    ) -> Result<()> {
        if issue_id == depends_on_id {
            return Err(BraidError::SelfDependency {
                id: issue_id.to_string(),
            });
        }
        if !self.issues.contains_key(issue_id) {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        if !self.issues.contains_key(depends_on_id) {
            return Err(BraidError::DependencyNotFound {
                id: depends_on_id.to_string(),
            });
        }
        if self.dependency_exists(issue_id, depends_on_id) {
            return Err(BraidError::DuplicateDependency {
                from: issue_id.to_string(),
                to: depends_on_id.to_string(),
            });
        }
        if dep_type.is_blocking() && self.would_create_cycle(issue_id, depends_on_id) {
            return Err(BraidError::DependencyCycle {
                path: format!("{issue_id} -> {depends_on_id}"),
            });
        }

        self.push_edge(issue_id, depends_on_id, dep_type, Some(actor));
        Ok(())
    }

    /// Add an edge without target-existence checking (the "allow" orphan
    /// policy at import). All other invariants still hold.
    ///
    /// # Errors
    ///
    /// Returns `SelfDependency`, `IssueNotFound` (source only),
    /// `DuplicateDependency`, or `DependencyCycle`.
    pub fn add_dependency_unchecked_target(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        created_by: Option<&str>,
    ) -> Result<()> {
        if issue_id == depends_on_id {
            return Err(BraidError::SelfDependency {
                id: issue_id.to_string(),
            });
        }
        if !self.issues.contains_key(issue_id) {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        if self.dependency_exists(issue_id, depends_on_id) {
            return Err(BraidError::DuplicateDependency {
                from: issue_id.to_string(),
                to: depends_on_id.to_string(),
            });
        }
        if dep_type.is_blocking() && self.would_create_cycle(issue_id, depends_on_id) {
            return Err(BraidError::DependencyCycle {
                path: format!("{issue_id} -> {depends_on_id}"),
            });
        }

        self.push_edge(issue_id, depends_on_id, dep_type, created_by);
        Ok(())
    }

    fn push_edge(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        created_by: Option<&str>,
    ) {
        let edge = Dependency {
            issue_id: issue_id.to_string(),
            depends_on_id: depends_on_id.to_string(),
            dep_type,
            created_at: Utc::now(),
            created_by: created_by.map(String::from),
        };
        if let Some(issue) = self.issues.get_mut(issue_id) {
            issue.dependencies.push(edge);
        }
        self.dirty_ids.insert(issue_id.to_string());
    }

    /// # Errors
    ///
    /// Returns `NothingToDo` if no such edge exists.
    pub fn remove_dependency(&mut self, issue_id: &str, depends_on_id: &str) -> Result<()> {
        let Some(issue) = self.issues.get_mut(issue_id) else {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        };
        let before = issue.dependencies.len();
        issue
            .dependencies
            .retain(|d| d.depends_on_id != depends_on_id);
        if issue.dependencies.len() == before {
            return Err(BraidError::NothingToDo {
                reason: format!("no dependency from {issue_id} to {depends_on_id}"),
            });
        }
        self.dirty_ids.insert(issue_id.to_string());
        Ok(())
    }

    #[must_use]
    pub fn dependency_exists(&self, issue_id: &str, depends_on_id: &str) -> bool {
        self.issues.get(issue_id).is_some_and(|i| {
            i.dependencies
                .iter()
                .any(|d| d.depends_on_id == depends_on_id)
        })
    }

    /// BFS from `depends_on_id` along blocking edges; true if `issue_id`
    /// is reachable (so the new edge would close a cycle).
    #[must_use]
    pub fn would_create_cycle(&self, issue_id: &str, depends_on_id: &str) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(depends_on_id.to_string());

        while let Some(current) = queue.pop_front() {
            if current == issue_id {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(issue) = self.issues.get(&current) {
                for dep in &issue.dependencies {
                    if dep.dep_type.is_blocking() {
                        queue.push_back(dep.depends_on_id.clone());
                    }
                }
            }
        }
        false
    }

    /// Full scan for cycles in the blocking subgraph. Returns one
    /// representative path per cycle found.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut done: HashSet<String> = HashSet::new();

        let mut ids: Vec<&String> = self.issues.keys().collect();
        ids.sort();

        for start in ids {
            if done.contains(start.as_str()) {
                continue;
            }
            let mut stack = vec![(start.clone(), vec![start.clone()])];
            let mut visited: HashSet<String> = HashSet::new();

            while let Some((current, path)) = stack.pop() {
                if !visited.insert(current.clone()) {
                    continue;
                }
                done.insert(current.clone());
                if let Some(issue) = self.issues.get(&current) {
                    for dep in &issue.dependencies {
                        if !dep.dep_type.is_blocking() {
                            continue;
                        }
                        if dep.depends_on_id == *start {
                            let mut cycle = path.clone();
                            cycle.push(start.clone());
                            cycles.push(cycle);
                        } else if !visited.contains(&dep.depends_on_id) {
                            let mut next_path = path.clone();
                            next_path.push(dep.depends_on_id.clone());
                            stack.push((dep.depends_on_id.clone(), next_path));
                        }
                    }
                }
            }
        }
        cycles
    }

    /// True when any open blocking dependency exists for the issue.
    #[must_use]
    pub fn is_blocked(&self, issue_id: &str) -> bool {
        self.issues.get(issue_id).is_some_and(|issue| {
            issue.dependencies.iter().any(|d| {
                d.dep_type.is_blocking()
                    && self
                        .issues
                        .get(&d.depends_on_id)
                        .is_some_and(|t| !t.status.is_terminal())
            })
        })
    }

    // ========================================================================
    // Labels / comments
    // ========================================================================

    /// # Errors
    ///
    /// Returns `IssueNotFound`.
    pub fn add_label(&mut self, issue_id: &str, label: &str) -> Result<()> {
        let issue = self
            .issues
            .get_mut(issue_id)
            .ok_or_else(|| BraidError::IssueNotFound {
                id: issue_id.to_string(),
            })?;
        if !issue.labels.iter().any(|l| l == label) {
            issue.labels.push(label.to_string());
            self.dirty_ids.insert(issue_id.to_string());
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `IssueNotFound`.
    pub fn add_comment(&mut self, issue_id: &str, author: &str, body: &str) -> Result<Comment> {
        let next_id = self.next_comment_id;
        let issue = self
            .issues
            .get_mut(issue_id)
            .ok_or_else(|| BraidError::IssueNotFound {
                id: issue_id.to_string(),
            })?;

        let comment = Comment {
            id: next_id,
            issue_id: issue_id.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };
        self.next_comment_id += 1;
        issue.comments.push(comment.clone());
        self.dirty_ids.insert(issue_id.to_string());
        Ok(comment)
    }

    // ========================================================================
    // Config / metadata
    // ========================================================================

    #[must_use]
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty_ids.is_empty()
    }

    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty_ids.len()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty_ids.clear();
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}
