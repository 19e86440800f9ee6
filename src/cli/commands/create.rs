use std::str::FromStr;

use braid_core::model::{Issue, IssueType, Priority};

use crate::cli::{CreateArgs, GlobalArgs};
use crate::error::{BraidError, Result};
use crate::format;
use crate::validation::LabelValidator;

use super::{Session, print_json};

/// Execute the create command.
///
/// # Errors
///
/// Returns an error when validation fails or the issue cannot be stored.
pub fn execute(args: CreateArgs, globals: GlobalArgs) -> Result<()> {
    let title = args
        .title
        .or(args.title_flag)
        .ok_or_else(|| BraidError::validation("title", "cannot be empty"))?;

    let priority = match args.priority.as_deref() {
        Some(p) => Priority::from_str(p)?,
        None => Priority::default(),
    };
    let issue_type = match args.type_.as_deref() {
        Some(t) => IssueType::from_str(t)?,
        None => IssueType::default(),
    };
    for label in &args.label {
        LabelValidator::validate(label)
            .map_err(|err| BraidError::from_validation_errors(vec![err]))?;
    }

    let mut session = Session::open(globals.no_db)?;
    let actor = session.actor();

    let issue = Issue {
        title,
        description: args.description,
        priority,
        issue_type,
        assignee: args.assignee,
        external_ref: args.external_ref,
        labels: args.label,
        created_by: Some(actor.clone()),
        ..Default::default()
    };
    let created = session.store.create_issue(&issue, &actor)?;
    session.flush()?;

    if globals.json {
        print_json(&created)?;
    } else {
        println!("Created {}", format::format_issue_line(&created));
    }
    Ok(())
}
