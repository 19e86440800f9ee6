//! `SQLite` cache backing the [`Storage`](super::Storage) trait.
//!
//! Scalar fields ride in a JSON `data` column with a handful of extracted
//! columns for indexing; relations get their own tables. A `dirty` table
//! records which records still need exporting to the JSONL log, so a
//! pending flush survives process restarts.
//!
//! Raw engine errors never leave this module; everything is translated to
//! record-oriented messages first.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::model::{Comment, Dependency, DependencyType, Issue};
use braid_core::store::DEFAULT_PREFIX;
use braid_core::update::{IssueUpdate, ListFilters};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS issues (
    id            TEXT PRIMARY KEY,
    data          TEXT NOT NULL,
    title         TEXT NOT NULL,
    status        TEXT NOT NULL,
    priority      INTEGER NOT NULL,
    issue_type    TEXT NOT NULL,
    assignee      TEXT,
    content_hash  TEXT,
    updated_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
CREATE INDEX IF NOT EXISTS idx_issues_assignee ON issues(assignee);

CREATE TABLE IF NOT EXISTS dependencies (
    issue_id      TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
    depends_on_id TEXT NOT NULL,
    dep_type      TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    created_by    TEXT,
    PRIMARY KEY (issue_id, depends_on_id)
);
CREATE INDEX IF NOT EXISTS idx_deps_target ON dependencies(depends_on_id);

CREATE TABLE IF NOT EXISTS labels (
    issue_id  TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
    label     TEXT NOT NULL,
    PRIMARY KEY (issue_id, label)
);

CREATE TABLE IF NOT EXISTS comments (
    id         INTEGER PRIMARY KEY,
    issue_id   TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
    author     TEXT NOT NULL,
    body       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dirty (
    id TEXT PRIMARY KEY
);
";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open (creating if needed) the cache at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(scrub)?;
        Self::init(conn)
    }

    /// In-memory cache, used by tests and throwaway operations.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on engine failure.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(scrub)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(scrub)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(scrub)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(scrub)?;
        conn.execute_batch(SCHEMA).map_err(scrub)?;
        Ok(Self { conn })
    }

    fn prefix(&self) -> Result<String> {
        Ok(self
            .config_value("prefix")?
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string()))
    }

    fn config_value(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM config WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(scrub)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .map_err(scrub)?;
        Ok(n > 0)
    }

    fn mark_dirty(&self, id: &str) -> Result<()> {
        self.conn
            .execute("INSERT OR IGNORE INTO dirty (id) VALUES (?1)", [id])
            .map_err(scrub)?;
        Ok(())
    }

    /// Write the issue row and its relations in one transaction.
    fn write_issue(&mut self, issue: &Issue) -> Result<()> {
        let mut scalar = issue.clone();
        scalar.labels = Vec::new();
        scalar.dependencies = Vec::new();
        scalar.comments = Vec::new();
        let data = serde_json::to_string(&scalar)?;

        let tx = self.conn.transaction().map_err(scrub)?;
        tx.execute(
            "INSERT INTO issues (id, data, title, status, priority, issue_type, assignee, content_hash, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               data = excluded.data, title = excluded.title, status = excluded.status,
               priority = excluded.priority, issue_type = excluded.issue_type,
               assignee = excluded.assignee, content_hash = excluded.content_hash,
               updated_at = excluded.updated_at",
            params![
                issue.id,
                data,
                issue.title,
                issue.status.as_str(),
                issue.priority.0,
                issue.issue_type.as_str(),
                issue.assignee,
                issue.content_hash,
                issue.updated_at.to_rfc3339(),
            ],
        )
        .map_err(scrub)?;

        tx.execute("DELETE FROM dependencies WHERE issue_id = ?1", [&issue.id])
            .map_err(scrub)?;
        tx.execute("DELETE FROM labels WHERE issue_id = ?1", [&issue.id])
            .map_err(scrub)?;
        tx.execute("DELETE FROM comments WHERE issue_id = ?1", [&issue.id])
            .map_err(scrub)?;

        for dep in &issue.dependencies {
            tx.execute(
                "INSERT OR IGNORE INTO dependencies (issue_id, depends_on_id, dep_type, created_at, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    issue.id,
                    dep.depends_on_id,
                    dep.dep_type.as_str(),
                    dep.created_at.to_rfc3339(),
                    dep.created_by,
                ],
            )
            .map_err(scrub)?;
        }
        for label in &issue.labels {
            tx.execute(
                "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
                params![issue.id, label],
            )
            .map_err(scrub)?;
        }
        for comment in &issue.comments {
            tx.execute(
                "INSERT OR REPLACE INTO comments (id, issue_id, author, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    comment.id,
                    issue.id,
                    comment.author,
                    comment.body,
                    comment.created_at.to_rfc3339(),
                ],
            )
            .map_err(scrub)?;
        }

        tx.commit().map_err(scrub)?;
        Ok(())
    }

    fn load_issue(&self, id: &str) -> Result<Issue> {
        let data: String = self
            .conn
            .query_row("SELECT data FROM issues WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(scrub)?
            .ok_or_else(|| BraidError::IssueNotFound { id: id.to_string() })?;

        let mut issue: Issue = serde_json::from_str(&data)?;
        issue.content_hash = Some(issue.compute_content_hash());
        issue.dependencies = self.load_dependencies(id)?;
        issue.labels = self.load_labels(id)?;
        issue.comments = self.load_comments(id)?;
        Ok(issue)
    }

    fn load_dependencies(&self, id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT depends_on_id, dep_type, created_at, created_by
                 FROM dependencies WHERE issue_id = ?1 ORDER BY depends_on_id",
            )
            .map_err(scrub)?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(scrub)?;

        let mut deps = Vec::new();
        for row in rows {
            let (depends_on_id, dep_type, created_at, created_by) = row.map_err(scrub)?;
            deps.push(Dependency {
                issue_id: id.to_string(),
                depends_on_id,
                dep_type: dep_type.parse()?,
                created_at: parse_timestamp(&created_at)?,
                created_by,
            });
        }
        Ok(deps)
    }

    fn load_labels(&self, id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM labels WHERE issue_id = ?1 ORDER BY label")
            .map_err(scrub)?;
        let rows = stmt.query_map([id], |row| row.get(0)).map_err(scrub)?;
        rows.collect::<std::result::Result<Vec<String>, _>>()
            .map_err(scrub)
    }

    fn load_comments(&self, id: &str) -> Result<Vec<Comment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, author, body, created_at FROM comments
                 WHERE issue_id = ?1 ORDER BY id",
            )
            .map_err(scrub)?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(scrub)?;

        let mut comments = Vec::new();
        for row in rows {
            let (comment_id, author, body, created_at) = row.map_err(scrub)?;
            comments.push(Comment {
                id: comment_id,
                issue_id: id.to_string(),
                author,
                body,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(comments)
    }

    fn all_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM issues ORDER BY id")
            .map_err(scrub)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(scrub)?;
        rows.collect::<std::result::Result<Vec<String>, _>>()
            .map_err(scrub)
    }

    /// Blocking edges as (from, to) pairs.
    fn blocking_edges(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT issue_id, depends_on_id FROM dependencies
                 WHERE dep_type IN ('blocks', 'parent-child') ORDER BY issue_id",
            )
            .map_err(scrub)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(scrub)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(scrub)
    }

    fn would_create_cycle(&self, issue_id: &str, depends_on_id: &str) -> Result<bool> {
        use std::collections::{HashSet, VecDeque};

        let edges = self.blocking_edges()?;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(depends_on_id.to_string());

        while let Some(current) = queue.pop_front() {
            if current == issue_id {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for (from, to) in &edges {
                if *from == current {
                    queue.push_back(to.clone());
                }
            }
        }
        Ok(false)
    }
}

impl super::Storage for SqliteStorage {
    fn create_issue(&mut self, issue: &Issue, actor: &str) -> Result<Issue> {
        if issue.title.trim().is_empty() {
            return Err(BraidError::validation("title", "cannot be empty"));
        }

        let mut new_issue = issue.clone();
        let now = Utc::now();

        if new_issue.id.is_empty() {
            let prefix = self.prefix()?;
            let count = self.issue_count()?;
            new_issue.id = braid_core::hash::generate_id(
                &prefix,
                &new_issue.title,
                new_issue.description.as_deref(),
                new_issue.created_by.as_deref().or(Some(actor)),
                now,
                count,
                |id| self.exists(id).unwrap_or(false),
            );
        } else if self.exists(&new_issue.id)? {
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

        self.write_issue(&new_issue)?;
        self.mark_dirty(&new_issue.id)?;
        debug!(id = %new_issue.id, "created issue");
        Ok(new_issue)
    }

    fn update_issue(&mut self, id: &str, update: &IssueUpdate, _actor: &str) -> Result<Issue> {
        if let Some(ref title) = update.title {
            if title.trim().is_empty() {
                return Err(BraidError::validation("title", "cannot be empty"));
            }
        }

        let mut issue = self.load_issue(id)?;
        let old_hash = issue.content_hash.clone();
        let now = Utc::now();
        update.apply(&mut issue, now);

        let new_hash = issue.compute_content_hash();
        if old_hash.as_deref() != Some(new_hash.as_str()) {
            issue.updated_at = now;
            issue.content_hash = Some(new_hash);
            self.write_issue(&issue)?;
            self.mark_dirty(id)?;
        }
        Ok(issue)
    }

    fn tombstone_issue(&mut self, id: &str, actor: &str, reason: Option<String>) -> Result<()> {
        let issue = self.load_issue(id)?;
        let mut ts = issue.into_tombstone(actor, reason);
        ts.updated_at = Utc::now();
        ts.content_hash = Some(ts.compute_content_hash());
        self.write_issue(&ts)?;
        self.mark_dirty(id)?;
        Ok(())
    }

    fn put_imported(&mut self, mut issue: Issue) -> Result<()> {
        issue.content_hash = Some(issue.compute_content_hash());
        self.write_issue(&issue)?;
        self.mark_dirty(&issue.id)?;
        Ok(())
    }

    fn remove_issue(&mut self, id: &str) -> Result<()> {
        // Relations go with the row via ON DELETE CASCADE.
        self.conn
            .execute("DELETE FROM issues WHERE id = ?1", params![id])
            .map_err(scrub)?;
        self.conn
            .execute("DELETE FROM dirty WHERE id = ?1", params![id])
            .map_err(scrub)?;
        Ok(())
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.load_issue(id)
    }

    fn id_exists(&self, id: &str) -> Result<bool> {
        self.exists(id)
    }

    fn list_issues(&self, filters: &ListFilters) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        for id in self.all_ids()? {
            let issue = self.load_issue(&id)?;
            if filters.matches(&issue) {
                issues.push(issue);
            }
        }
        issues.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        if let Some(limit) = filters.limit {
            issues.truncate(limit);
        }
        Ok(issues)
    }

    fn resolve_id(&self, input: &str) -> Result<String> {
        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(BraidError::InvalidId { id: String::new() });
        }
        if self.exists(&input)? {
            return Ok(input);
        }
        if !input.contains('-') {
            let with_prefix = format!("{}-{}", self.prefix()?, input);
            if self.exists(&with_prefix)? {
                return Ok(with_prefix);
            }
        }

        let pattern = input
            .rfind('-')
            .map_or(input.as_str(), |pos| &input[pos + 1..]);
        let mut matches: Vec<String> = self
            .all_ids()?
            .into_iter()
            .filter(|id| {
                braid_core::hash::split_id(id).is_some_and(|(_, suffix)| suffix.contains(pattern))
            })
            .collect();

        if matches.len() == 1 {
            return Ok(matches.remove(0));
        }
        Err(BraidError::IssueNotFound { id: input })
    }

    fn export_issues(&self) -> Result<Vec<Issue>> {
        self.all_ids()?
            .iter()
            .map(|id| self.load_issue(id))
            .collect()
    }

    fn issue_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .map_err(scrub)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn add_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dep_type: DependencyType,
        created_by: Option<&str>,
        require_target: bool,
    ) -> Result<()> {
        if issue_id == depends_on_id {
            return Err(BraidError::SelfDependency {
                id: issue_id.to_string(),
            });
        }
        if !self.exists(issue_id)? {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        if require_target && !self.exists(depends_on_id)? {
            return Err(BraidError::DependencyNotFound {
                id: depends_on_id.to_string(),
            });
        }
        let dup: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
                params![issue_id, depends_on_id],
                |row| row.get(0),
            )
            .map_err(scrub)?;
        if dup > 0 {
            return Err(BraidError::DuplicateDependency {
                from: issue_id.to_string(),
                to: depends_on_id.to_string(),
            });
        }
        if dep_type.is_blocking() && self.would_create_cycle(issue_id, depends_on_id)? {
            return Err(BraidError::DependencyCycle {
                path: format!("{issue_id} -> {depends_on_id}"),
            });
        }

        // Anything the engine still rejects here is a referential problem,
        // reported against the target record rather than as raw SQL.
        self.conn
            .execute(
                "INSERT INTO dependencies (issue_id, depends_on_id, dep_type, created_at, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    issue_id,
                    depends_on_id,
                    dep_type.as_str(),
                    Utc::now().to_rfc3339(),
                    created_by,
                ],
            )
            .map_err(|e| scrub_reference(e, depends_on_id))?;
        self.mark_dirty(issue_id)?;
        Ok(())
    }

    fn remove_dependency(&mut self, issue_id: &str, depends_on_id: &str) -> Result<()> {
        if !self.exists(issue_id)? {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        let removed = self
            .conn
            .execute(
                "DELETE FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
                params![issue_id, depends_on_id],
            )
            .map_err(scrub)?;
        if removed == 0 {
            return Err(BraidError::NothingToDo {
                reason: format!("no dependency from {issue_id} to {depends_on_id}"),
            });
        }
        self.mark_dirty(issue_id)?;
        Ok(())
    }

    fn find_cycles(&self) -> Result<Vec<Vec<String>>> {
        use std::collections::{HashMap, HashSet};

        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in self.blocking_edges()? {
            adjacency.entry(from).or_default().push(to);
        }

        let mut cycles = Vec::new();
        let mut done: HashSet<String> = HashSet::new();
        let mut starts: Vec<&String> = adjacency.keys().collect();
        starts.sort();

        for start in starts {
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
                for next in adjacency.get(&current).into_iter().flatten() {
                    if next == start {
                        let mut cycle = path.clone();
                        cycle.push(start.clone());
                        cycles.push(cycle);
                    } else if !visited.contains(next) {
                        let mut next_path = path.clone();
                        next_path.push(next.clone());
                        stack.push((next.clone(), next_path));
                    }
                }
            }
        }
        Ok(cycles)
    }

    fn add_label(&mut self, issue_id: &str, label: &str) -> Result<()> {
        if !self.exists(issue_id)? {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        self.conn
            .execute(
                "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
                params![issue_id, label],
            )
            .map_err(scrub)?;
        self.mark_dirty(issue_id)?;
        Ok(())
    }

    fn add_comment(&mut self, issue_id: &str, author: &str, body: &str) -> Result<Comment> {
        if !self.exists(issue_id)? {
            return Err(BraidError::IssueNotFound {
                id: issue_id.to_string(),
            });
        }
        let created_at = Utc::now();
        self.conn
            .execute(
                "INSERT INTO comments (issue_id, author, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![issue_id, author, body, created_at.to_rfc3339()],
            )
            .map_err(scrub)?;
        let id = self.conn.last_insert_rowid();
        self.mark_dirty(issue_id)?;
        Ok(Comment {
            id,
            issue_id: issue_id.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            created_at,
        })
    }

    fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.config_value(key)
    }

    fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(scrub)?;
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(scrub)
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(scrub)?;
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(self.dirty_count()? > 0)
    }

    fn dirty_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM dirty", [], |row| row.get(0))
            .map_err(scrub)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn clear_dirty(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM dirty", []).map_err(scrub)?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BraidError::Storage(format!("bad timestamp '{s}': {e}")))
}

/// Strip engine detail from an error that carries no record context.
fn scrub(e: rusqlite::Error) -> BraidError {
    BraidError::Storage(e.to_string())
}

/// Constraint failures on a dependency insert mean the reference is bad;
/// report the missing record, never the SQL.
fn scrub_reference(e: rusqlite::Error, target: &str) -> BraidError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return BraidError::DependencyNotFound {
                id: target.to_string(),
            };
        }
    }
    scrub(e)
}
