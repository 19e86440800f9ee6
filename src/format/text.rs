//! Text formatting for terminal output.
//!
//! - Status icons (○ ◐ ● ❄ ✓ ✗)
//! - Priority labels (P0-P4)
//! - Type badges ([bug], [feature], etc.)
//! - Issue lines, tables, and operation summaries

use unicode_width::UnicodeWidthStr;

use braid_core::model::{Issue, IssueType, Priority, Status};

use crate::engine::import::ImportResult;
use crate::engine::tombstone::PruneResult;

/// Status icon characters.
pub mod icons {
    /// Open issue - available to work (hollow circle).
    pub const OPEN: &str = "○";
    /// In progress - active work (half-filled).
    pub const IN_PROGRESS: &str = "◐";
    /// Blocked - needs attention (filled circle).
    pub const BLOCKED: &str = "●";
    /// Deferred - scheduled for later (snowflake).
    pub const DEFERRED: &str = "❄";
    /// Closed - completed (checkmark).
    pub const CLOSED: &str = "✓";
    /// Tombstone - soft deleted (X mark).
    pub const TOMBSTONE: &str = "✗";
    /// Unknown status.
    pub const UNKNOWN: &str = "?";
}

/// Return the icon character for a status.
#[must_use]
pub const fn format_status_icon(status: &Status) -> &'static str {
    match status {
        Status::Open => icons::OPEN,
        Status::InProgress => icons::IN_PROGRESS,
        Status::Blocked => icons::BLOCKED,
        Status::Deferred => icons::DEFERRED,
        Status::Closed => icons::CLOSED,
        Status::Tombstone => icons::TOMBSTONE,
        Status::Custom(_) => icons::UNKNOWN,
    }
}

/// Format priority as "P0", "P1", etc.
#[must_use]
pub fn format_priority(priority: &Priority) -> String {
    format!("P{}", priority.0)
}

/// Format issue type as a bracketed badge.
#[must_use]
pub fn format_type_badge(issue_type: &IssueType) -> String {
    format!("[{}]", issue_type.as_str())
}

/// Format a single-line issue summary.
///
/// Format: `{icon} {id} [{priority}] [{type}] {title}`
#[must_use]
pub fn format_issue_line(issue: &Issue) -> String {
    format!(
        "{} {} [{}] {} {}",
        format_status_icon(&issue.status),
        issue.id,
        format_priority(&issue.priority),
        format_type_badge(&issue.issue_type),
        issue.title,
    )
}

/// Format a list of issues as aligned columns.
#[must_use]
pub fn format_issue_table(issues: &[Issue]) -> String {
    let id_width = issues
        .iter()
        .map(|i| i.id.width())
        .max()
        .unwrap_or(0)
        .max(2);

    let mut out = String::new();
    for issue in issues {
        out.push_str(&format!(
            "{} {}{} [{}] {} {}\n",
            format_status_icon(&issue.status),
            issue.id,
            " ".repeat(id_width - issue.id.width()),
            format_priority(&issue.priority),
            format_type_badge(&issue.issue_type),
            issue.title,
        ));
    }
    out
}

/// Multi-line detail view used by `show`.
#[must_use]
pub fn format_issue_details(issue: &Issue) -> String {
    let mut out = format!(
        "{}\n\nstatus:   {}\npriority: {}\ntype:     {}\n",
        format_issue_line(issue),
        issue.status,
        format_priority(&issue.priority),
        issue.issue_type,
    );

    if let Some(assignee) = &issue.assignee {
        out.push_str(&format!("assignee: {assignee}\n"));
    }
    if !issue.labels.is_empty() {
        out.push_str(&format!("labels:   {}\n", issue.labels.join(", ")));
    }
    if let Some(external_ref) = &issue.external_ref {
        out.push_str(&format!("ref:      {external_ref}\n"));
    }
    out.push_str(&format!(
        "created:  {}\nupdated:  {}\n",
        issue.created_at.format("%Y-%m-%d %H:%M"),
        issue.updated_at.format("%Y-%m-%d %H:%M"),
    ));
    if let Some(closed_at) = &issue.closed_at {
        out.push_str(&format!("closed:   {}\n", closed_at.format("%Y-%m-%d %H:%M")));
        if let Some(reason) = &issue.close_reason {
            out.push_str(&format!("reason:   {reason}\n"));
        }
    }
    if issue.is_tombstone() {
        if let Some(deleted_at) = &issue.deleted_at {
            out.push_str(&format!(
                "deleted:  {} by {}\n",
                deleted_at.format("%Y-%m-%d %H:%M"),
                issue.deleted_by.as_deref().unwrap_or("unknown"),
            ));
        }
    }

    if let Some(description) = &issue.description {
        out.push_str(&format!("\n{description}\n"));
    }
    if !issue.dependencies.is_empty() {
        out.push_str("\ndependencies:\n");
        for dep in &issue.dependencies {
            out.push_str(&format!("  {} -> {}\n", dep.dep_type, dep.depends_on_id));
        }
    }
    if !issue.comments.is_empty() {
        out.push_str("\ncomments:\n");
        for comment in &issue.comments {
            out.push_str(&format!(
                "  [{}] {}: {}\n",
                comment.created_at.format("%Y-%m-%d %H:%M"),
                comment.author,
                comment.body,
            ));
        }
    }
    out
}

/// One-paragraph summary of an import run.
#[must_use]
pub fn format_import_summary(result: &ImportResult) -> String {
    let mut out = format!(
        "Import{}: {} created, {} updated, {} unchanged, {} skipped",
        if result.dry_run { " (dry run)" } else { "" },
        result.created,
        result.updated,
        result.unchanged,
        result.skipped,
    );
    if !result.remapped.is_empty() {
        out.push_str(&format!("\nRemapped {} identifier(s):", result.remapped.len()));
        for (old, new) in &result.remapped {
            out.push_str(&format!("\n  {old} -> {new}"));
        }
    }
    if !result.skipped_dependencies.is_empty() {
        out.push_str(&format!(
            "\nSkipped {} dependency edge(s) with missing targets:",
            result.skipped_dependencies.len()
        ));
        for (from, to) in &result.skipped_dependencies {
            out.push_str(&format!("\n  {from} -> {to}"));
        }
    }
    out
}

/// Summary of a tombstone prune (or its preview).
#[must_use]
pub fn format_prune_summary(result: &PruneResult, preview: bool) -> String {
    if result.pruned_count == 0 {
        return format!(
            "No tombstones older than {} day(s) to prune",
            result.ttl_days
        );
    }
    let mut out = format!(
        "{} {} tombstone(s) older than {} day(s)",
        if preview { "Would prune" } else { "Pruned" },
        result.pruned_count,
        result.ttl_days,
    );
    for id in &result.pruned_ids {
        out.push_str(&format!("\n  {id}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_issue() -> Issue {
        Issue {
            id: "bi-test".to_string(),
            title: "Test title".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn status_icons() {
        assert_eq!(format_status_icon(&Status::Open), "○");
        assert_eq!(format_status_icon(&Status::InProgress), "◐");
        assert_eq!(format_status_icon(&Status::Blocked), "●");
        assert_eq!(format_status_icon(&Status::Deferred), "❄");
        assert_eq!(format_status_icon(&Status::Closed), "✓");
        assert_eq!(format_status_icon(&Status::Tombstone), "✗");
        assert_eq!(
            format_status_icon(&Status::Custom("custom".to_string())),
            "?"
        );
    }

    #[test]
    fn priority_labels() {
        assert_eq!(format_priority(&Priority::CRITICAL), "P0");
        assert_eq!(format_priority(&Priority::BACKLOG), "P4");
    }

    #[test]
    fn issue_line_layout() {
        let line = format_issue_line(&make_test_issue());
        assert_eq!(line, "○ bi-test [P2] [task] Test title");
    }

    #[test]
    fn table_aligns_ids() {
        let mut short = make_test_issue();
        short.id = "bi-a1".to_string();
        let mut long = make_test_issue();
        long.id = "bi-abcdef12".to_string();

        let table = format_issue_table(&[short, long]);
        let lines: Vec<&str> = table.lines().collect();
        let col = |line: &str| line.find("[P").unwrap();
        assert_eq!(col(lines[0]), col(lines[1]));
    }

    #[test]
    fn import_summary_mentions_remaps() {
        let result = ImportResult {
            created: 1,
            remapped: vec![("xx-old1".to_string(), "bi-new1".to_string())],
            ..Default::default()
        };
        let text = format_import_summary(&result);
        assert!(text.contains("1 created"));
        assert!(text.contains("xx-old1 -> bi-new1"));
    }

    #[test]
    fn prune_summary_distinguishes_preview() {
        let result = PruneResult {
            pruned_count: 1,
            pruned_ids: vec!["bi-dead".to_string()],
            ttl_days: 30,
        };
        assert!(format_prune_summary(&result, true).starts_with("Would prune"));
        assert!(format_prune_summary(&result, false).starts_with("Pruned"));
    }
}
