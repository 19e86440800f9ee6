use braid_core::model::Status;
use braid_core::update::IssueUpdate;

use crate::cli::{CloseArgs, GlobalArgs};
use crate::error::Result;
use crate::format;

use super::Session;

/// Execute the close command.
///
/// # Errors
///
/// Returns an error when any ID cannot be resolved.
pub fn execute(args: &CloseArgs, globals: GlobalArgs) -> Result<()> {
    let mut session = Session::open(globals.no_db)?;
    let actor = session.actor();
    let update = IssueUpdate {
        status: Some(Status::Closed),
        close_reason: Some(args.reason.clone()),
        ..IssueUpdate::default()
    };

    let mut closed = Vec::with_capacity(args.ids.len());
    for input in &args.ids {
        let id = session.store.resolve_id(input)?;
        closed.push(session.store.update_issue(&id, &update, &actor)?);
    }
    session.flush()?;

    if globals.json {
        super::print_json(&closed)?;
    } else {
        for issue in &closed {
            println!("Closed {}", format::format_issue_line(issue));
        }
    }
    Ok(())
}
