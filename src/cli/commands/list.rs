use std::str::FromStr;

use braid_core::model::{IssueType, Priority, Status};
use braid_core::update::ListFilters;

use crate::cli::{GlobalArgs, ListArgs};
use crate::error::Result;
use crate::format;

use super::{Session, print_json};

/// Execute the list command.
///
/// # Errors
///
/// Returns an error when a filter value fails to parse.
pub fn execute(args: &ListArgs, globals: GlobalArgs) -> Result<()> {
    let filters = build_filters(args)?;
    let session = Session::open(globals.no_db)?;
    let issues = session.store.list_issues(&filters)?;

    if globals.json {
        print_json(&issues)?;
    } else if issues.is_empty() {
        println!("No issues found");
    } else {
        print!("{}", format::format_issue_table(&issues));
    }
    Ok(())
}

fn build_filters(args: &ListArgs) -> Result<ListFilters> {
    let mut filters = ListFilters {
        assignee: args.assignee.clone(),
        title_contains: args.title.clone(),
        include_closed: args.all,
        include_deferred: args.deferred || args.all,
        limit: args.limit,
        ..ListFilters::default()
    };
    if !args.status.is_empty() {
        filters.statuses = Some(
            args.status
                .iter()
                .map(|s| Status::from_str(s))
                .collect::<Result<Vec<_>>>()?,
        );
    }
    if !args.type_.is_empty() {
        filters.types = Some(
            args.type_
                .iter()
                .map(|t| IssueType::from_str(t))
                .collect::<Result<Vec<_>>>()?,
        );
    }
    if !args.priority.is_empty() {
        filters.priorities = Some(
            args.priority
                .iter()
                .map(|p| Priority::from_str(p))
                .collect::<Result<Vec<_>>>()?,
        );
    }
    if !args.label.is_empty() {
        filters.labels = Some(args.label.clone());
    }
    Ok(filters)
}
