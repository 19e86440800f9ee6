use std::str::FromStr;

use chrono::{DateTime, Utc};

use braid_core::model::{IssueType, Priority, Status};
use braid_core::update::IssueUpdate;

use crate::cli::{GlobalArgs, UpdateArgs};
use crate::error::{BraidError, Result};
use crate::format;

use super::{Session, print_json};

/// An empty string on a clearable flag means "clear the field".
fn clearable(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Execute the update command.
///
/// # Errors
///
/// Returns an error when the issue cannot be found or a flag fails to
/// parse.
pub fn execute(args: &UpdateArgs, globals: GlobalArgs) -> Result<()> {
    let mut update = IssueUpdate {
        title: args.title.clone(),
        description: args.description.as_deref().map(clearable),
        design: args.design.as_deref().map(clearable),
        notes: args.notes.as_deref().map(clearable),
        assignee: args.assignee.as_deref().map(clearable),
        ..IssueUpdate::default()
    };
    if let Some(status) = args.status.as_deref() {
        update.status = Some(Status::from_str(status)?);
    }
    if let Some(priority) = args.priority.as_deref() {
        update.priority = Some(Priority::from_str(priority)?);
    }
    if let Some(type_) = args.type_.as_deref() {
        update.issue_type = Some(IssueType::from_str(type_)?);
    }
    if let Some(defer) = args.defer_until.as_deref() {
        update.defer_until = Some(if defer.is_empty() {
            None
        } else {
            Some(parse_timestamp(defer)?)
        });
    }
    if update.is_empty() {
        return Err(BraidError::NothingToDo {
            reason: "no fields to update".to_string(),
        });
    }

    let mut session = Session::open(globals.no_db)?;
    let actor = session.actor();
    let id = session.store.resolve_id(&args.id)?;
    let updated = session.store.update_issue(&id, &update, &actor)?;
    session.flush()?;

    if globals.json {
        print_json(&updated)?;
    } else {
        println!("Updated {}", format::format_issue_line(&updated));
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BraidError::validation("defer_until", format!("not an RFC 3339 timestamp: {e}")))
}
