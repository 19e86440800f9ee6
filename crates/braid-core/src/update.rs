//! Sum-typed field updates.
//!
//! One optional slot per known field; clearable fields use `Option<Option<T>>`
//! so "leave alone", "set", and "clear" are all representable without a
//! dynamically-typed map.

use chrono::{DateTime, Utc};

use crate::model::{Issue, IssueType, Priority, Status};

/// Fields to update on an issue.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub design: Option<Option<String>>,
    pub acceptance_criteria: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<Option<String>>,
    pub defer_until: Option<Option<DateTime<Utc>>>,
    pub external_ref: Option<Option<String>>,
    pub closed_at: Option<Option<DateTime<Utc>>>,
    pub close_reason: Option<Option<String>>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
    pub deleted_by: Option<Option<String>>,
    pub delete_reason: Option<Option<String>>,
}

impl IssueUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.design.is_none()
            && self.acceptance_criteria.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.assignee.is_none()
            && self.defer_until.is_none()
            && self.external_ref.is_none()
            && self.closed_at.is_none()
            && self.close_reason.is_none()
            && self.deleted_at.is_none()
            && self.deleted_by.is_none()
            && self.delete_reason.is_none()
    }

    /// Apply the populated fields to an issue in place.
    ///
    /// Moving to a terminal status stamps `closed_at` with `now`; moving
    /// back to an active one clears it. Content hash and `updated_at` are
    /// the caller's responsibility, since only the caller knows whether
    /// the change was semantic.
    pub fn apply(&self, issue: &mut Issue, now: DateTime<Utc>) {
        if let Some(ref title) = self.title {
            issue.title.clone_from(title);
        }
        if let Some(ref desc) = self.description {
            issue.description.clone_from(desc);
        }
        if let Some(ref design) = self.design {
            issue.design.clone_from(design);
        }
        if let Some(ref ac) = self.acceptance_criteria {
            issue.acceptance_criteria.clone_from(ac);
        }
        if let Some(ref notes) = self.notes {
            issue.notes.clone_from(notes);
        }
        if let Some(ref status) = self.status {
            issue.status = status.clone();
            if status.is_terminal() && issue.closed_at.is_none() {
                issue.closed_at = Some(now);
            } else if !status.is_terminal() && issue.closed_at.is_some() {
                issue.closed_at = None;
            }
        }
        if let Some(priority) = self.priority {
            issue.priority = priority;
        }
        if let Some(ref issue_type) = self.issue_type {
            issue.issue_type = issue_type.clone();
        }
        if let Some(ref assignee) = self.assignee {
            issue.assignee.clone_from(assignee);
        }
        if let Some(ref defer) = self.defer_until {
            issue.defer_until = *defer;
        }
        if let Some(ref ext_ref) = self.external_ref {
            issue.external_ref.clone_from(ext_ref);
        }
        if let Some(ref closed_at) = self.closed_at {
            issue.closed_at = *closed_at;
        }
        if let Some(ref reason) = self.close_reason {
            issue.close_reason.clone_from(reason);
        }
        if let Some(ref deleted_at) = self.deleted_at {
            issue.deleted_at = *deleted_at;
        }
        if let Some(ref deleted_by) = self.deleted_by {
            issue.deleted_by.clone_from(deleted_by);
        }
        if let Some(ref reason) = self.delete_reason {
            issue.delete_reason.clone_from(reason);
        }
    }
}

/// Filter options for listing issues.
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ListFilters {
    pub statuses: Option<Vec<Status>>,
    pub types: Option<Vec<IssueType>>,
    pub priorities: Option<Vec<Priority>>,
    pub assignee: Option<String>,
    pub include_closed: bool,
    pub include_deferred: bool,
    pub title_contains: Option<String>,
    /// Labels that must all be present.
    pub labels: Option<Vec<String>>,
    pub limit: Option<usize>,
}

impl ListFilters {
    /// Whether an issue passes every active filter. `limit` is applied by
    /// the caller after sorting.
    #[must_use]
    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&issue.status) {
                return false;
            }
        } else {
            if !self.include_closed && issue.status.is_terminal() {
                return false;
            }
            if !self.include_deferred && issue.status == Status::Deferred {
                return false;
            }
        }

        if let Some(ref types) = self.types {
            if !types.contains(&issue.issue_type) {
                return false;
            }
        }
        if let Some(ref priorities) = self.priorities {
            if !priorities.contains(&issue.priority) {
                return false;
            }
        }
        if let Some(ref assignee) = self.assignee {
            if issue.assignee.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(ref query) = self.title_contains {
            if !issue.title.to_lowercase().contains(&query.to_lowercase()) {
                return false;
            }
        }
        if let Some(ref required) = self.labels {
            if !required.iter().all(|l| issue.labels.contains(l)) {
                return false;
            }
        }
        true
    }
}
