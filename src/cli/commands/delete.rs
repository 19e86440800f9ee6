use crate::cli::{DeleteArgs, GlobalArgs};
use crate::error::Result;

use super::Session;

/// Execute the delete command. Deletion is a tombstone, not a removal;
/// the record stays in the log until the TTL prunes it.
///
/// # Errors
///
/// Returns an error when any ID cannot be resolved.
pub fn execute(args: &DeleteArgs, globals: GlobalArgs) -> Result<()> {
    let mut session = Session::open(globals.no_db)?;
    let actor = session.actor();

    let mut deleted = Vec::with_capacity(args.ids.len());
    for input in &args.ids {
        let id = session.store.resolve_id(input)?;
        session
            .store
            .tombstone_issue(&id, &actor, args.reason.clone())?;
        deleted.push(id);
    }
    session.flush()?;

    if globals.json {
        super::print_json(&deleted)?;
    } else {
        for id in &deleted {
            println!("Deleted {id} (tombstoned)");
        }
    }
    Ok(())
}
