use chrono::Utc;

use crate::cli::{CompactArgs, GlobalArgs};
use crate::engine::tombstone::TombstoneLifecycle;
use crate::error::{BraidError, Result};
use crate::format;

use super::{Session, print_json};

/// Execute the compact command.
///
/// # Errors
///
/// Returns an error when the log cannot be read or rewritten.
pub fn execute(args: &CompactArgs, globals: GlobalArgs) -> Result<()> {
    if !args.prune {
        return Err(BraidError::NothingToDo {
            reason: "nothing to compact; did you mean --prune?".to_string(),
        });
    }

    let mut session = Session::open(globals.no_db)?;
    let ttl_days = args
        .older_than
        .unwrap_or_else(|| session.workspace.tombstone_ttl_days());
    let lifecycle = TombstoneLifecycle::new(ttl_days, &session.cancel);
    let log_path = session.workspace.issues_path();
    let now = Utc::now();

    let result = if args.dry_run {
        lifecycle.preview(&log_path, now)?
    } else {
        let result = lifecycle.prune(&log_path, now)?;
        // Drop the expired rows from the cache too, or the next flush
        // would resurrect them.
        for id in &result.pruned_ids {
            session.store.remove_issue(id)?;
        }
        result
    };

    if globals.json {
        print_json(&result)?;
    } else {
        println!("{}", format::format_prune_summary(&result, args.dry_run));
    }
    Ok(())
}
