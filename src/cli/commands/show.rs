use crate::cli::{GlobalArgs, ShowArgs};
use crate::error::Result;
use crate::format;

use super::{Session, print_json};

/// Execute the show command.
///
/// # Errors
///
/// Returns an error when the ID cannot be resolved.
pub fn execute(args: &ShowArgs, globals: GlobalArgs) -> Result<()> {
    let session = Session::open(globals.no_db)?;
    let id = session.store.resolve_id(&args.id)?;
    let issue = session.store.get_issue(&id)?;

    if globals.json {
        print_json(&issue)?;
    } else {
        print!("{}", format::format_issue_details(&issue));
    }
    Ok(())
}
