//! Record validation.
//!
//! Pure checks over parsed records, used by the import pipeline before any
//! store mutation. Dependency integrity (self-edges, duplicates, cycles,
//! missing targets) is enforced by the storage layer itself.

use braid_core::error::ValidationError;
use braid_core::model::{Comment, Issue, Priority};

/// Validates issue fields and invariants.
pub struct IssueValidator;

impl IssueValidator {
    /// Validate an issue and return every violation found.
    ///
    /// # Errors
    ///
    /// Returns a `Vec<ValidationError>` listing each failed rule.
    pub fn validate(issue: &Issue) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if issue.id.trim().is_empty() {
            errors.push(ValidationError::new("id", "cannot be empty"));
        }
        if issue.id.len() > 50 {
            errors.push(ValidationError::new("id", "exceeds 50 characters"));
        }
        if !issue.id.is_empty() && !is_valid_id_format(&issue.id) {
            errors.push(ValidationError::new(
                "id",
                "invalid format (expected prefix-hash)",
            ));
        }

        if issue.title.trim().is_empty() {
            errors.push(ValidationError::new("title", "cannot be empty"));
        }
        if issue.title.len() > 500 {
            errors.push(ValidationError::new("title", "exceeds 500 characters"));
        }

        if let Some(description) = issue.description.as_ref() {
            if description.len() > 102_400 {
                errors.push(ValidationError::new("description", "exceeds 100KB"));
            }
        }

        if issue.priority.0 < Priority::CRITICAL.0 || issue.priority.0 > Priority::BACKLOG.0 {
            errors.push(ValidationError::new("priority", "must be 0-4"));
        }

        if issue.updated_at < issue.created_at {
            errors.push(ValidationError::new(
                "updated_at",
                "cannot be before created_at",
            ));
        }

        // Tombstones have to be reconstructible: who and when are required.
        if issue.is_tombstone() && issue.deleted_at.is_none() {
            errors.push(ValidationError::new(
                "deleted_at",
                "required on tombstone records",
            ));
        }

        if let Some(external_ref) = issue.external_ref.as_ref() {
            if external_ref.len() > 200 {
                errors.push(ValidationError::new(
                    "external_ref",
                    "exceeds 200 characters",
                ));
            }
            if external_ref.chars().any(char::is_whitespace) {
                errors.push(ValidationError::new(
                    "external_ref",
                    "cannot contain whitespace",
                ));
            }
        }

        for label in &issue.labels {
            if let Err(err) = LabelValidator::validate(label) {
                errors.push(err);
            }
        }
        for comment in &issue.comments {
            if let Err(mut comment_errors) = CommentValidator::validate(comment) {
                errors.append(&mut comment_errors);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Validates a single label value.
pub struct LabelValidator;

impl LabelValidator {
    /// Validate a label for length and allowed characters.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the label is invalid.
    pub fn validate(label: &str) -> Result<(), ValidationError> {
        if label.is_empty() {
            return Err(ValidationError::new("label", "cannot be empty"));
        }
        if label.len() > 50 {
            return Err(ValidationError::new("label", "exceeds 50 characters"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::new(
                "label",
                "invalid characters (only alphanumeric, hyphen, underscore allowed)",
            ));
        }
        Ok(())
    }
}

/// Validates comment fields.
pub struct CommentValidator;

impl CommentValidator {
    /// Validate a comment and return every violation found.
    ///
    /// # Errors
    ///
    /// Returns a `Vec<ValidationError>` listing each failed rule.
    pub fn validate(comment: &Comment) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if comment.issue_id.trim().is_empty() {
            errors.push(ValidationError::new("issue_id", "cannot be empty"));
        }
        if comment.body.trim().is_empty() {
            errors.push(ValidationError::new("text", "cannot be empty"));
        }
        if comment.body.len() > 51_200 {
            errors.push(ValidationError::new("text", "exceeds 50KB"));
        }
        if comment.author.trim().is_empty() {
            errors.push(ValidationError::new("author", "cannot be empty"));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Well-formed ID: lowercase prefix, dash, 3-8 char base36 hash.
#[must_use]
pub fn is_valid_id_format(id: &str) -> bool {
    let Some((prefix, hash)) = braid_core::hash::split_id(id) else {
        return false;
    };

    if prefix.is_empty() || prefix.len() > 10 {
        return false;
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return false;
    }

    if hash.len() < 3 || hash.len() > 8 {
        return false;
    }
    hash.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::model::Status;
    use chrono::{TimeZone, Utc};

    fn base_issue() -> Issue {
        Issue {
            id: "bi-abc123".to_string(),
            title: "Test issue".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_title() {
        let mut issue = base_issue();
        issue.title = " ".to_string();
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "title"));
    }

    #[test]
    fn rejects_empty_id() {
        let mut issue = base_issue();
        issue.id = String::new();
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "id"));
    }

    #[test]
    fn rejects_priority_out_of_range() {
        let mut issue = base_issue();
        issue.priority = Priority(9);
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "priority"));
    }

    #[test]
    fn rejects_tombstone_without_deleted_at() {
        let mut issue = base_issue();
        issue.status = Status::Tombstone;
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "deleted_at"));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut issue = base_issue();
        issue.id = String::new();
        issue.title = String::new();
        issue.priority = Priority(9);
        issue.updated_at = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();

        let errors = IssueValidator::validate(&issue).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|err| err.field.as_str()).collect();
        assert!(fields.contains(&"id"));
        assert!(fields.contains(&"title"));
        assert!(fields.contains(&"priority"));
        assert!(fields.contains(&"updated_at"));
    }

    #[test]
    fn rejects_external_ref_whitespace() {
        let mut issue = base_issue();
        issue.external_ref = Some("gh 12".to_string());
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "external_ref"));
    }

    #[test]
    fn rejects_issue_with_malformed_label() {
        let mut issue = base_issue();
        issue.labels = vec!["ok-label".to_string(), "bad label, punctuated!".to_string()];
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "label"));
    }

    #[test]
    fn rejects_issue_with_overlong_label() {
        let mut issue = base_issue();
        issue.labels = vec!["x".repeat(80)];
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "label"));
    }

    #[test]
    fn rejects_issue_with_empty_comment_body() {
        let mut issue = base_issue();
        issue.comments = vec![Comment {
            id: 1,
            issue_id: issue.id.clone(),
            author: "tester".to_string(),
            body: " ".to_string(),
            created_at: issue.created_at,
        }];
        let errors = IssueValidator::validate(&issue).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "text"));
    }

    #[test]
    fn label_rejects_invalid_characters() {
        let err = LabelValidator::validate("bad label").unwrap_err();
        assert_eq!(err.field, "label");
    }

    #[test]
    fn comment_rejects_empty_body() {
        let comment = Comment {
            id: 1,
            issue_id: "bi-abc123".to_string(),
            author: "tester".to_string(),
            body: " ".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        };
        let errors = CommentValidator::validate(&comment).unwrap_err();
        assert!(errors.iter().any(|err| err.field == "text"));
    }

    #[test]
    fn id_format_accepts_generated_ids() {
        assert!(is_valid_id_format("bi-abc123"));
        assert!(is_valid_id_format("braid9-0a9"));
    }

    #[test]
    fn id_format_rejects_malformed_ids() {
        assert!(!is_valid_id_format("BI-abc123"));
        assert!(!is_valid_id_format("bi-ABC"));
        assert!(!is_valid_id_format("bi-1"));
        assert!(!is_valid_id_format("bi-abc123456"));
        assert!(!is_valid_id_format("bi_abc"));
    }
}
