use crate::cli::{GlobalArgs, SyncArgs};
use crate::engine::flush::{DEFAULT_DEBOUNCE, FlushScheduler};
use crate::engine::sync::{SyncCoordinator, SyncOptions, SyncReport};
use crate::error::Result;

use super::{Session, print_json};

/// Execute the sync command.
///
/// # Errors
///
/// `Divergence` and `MergeConflict` are the user-action failure modes;
/// both exit with code 1 and printed guidance.
pub fn execute(args: &SyncArgs, globals: GlobalArgs) -> Result<()> {
    let mut session = Session::open(globals.no_db)?;
    if args.flush_only {
        return flush_only(session, args, globals);
    }
    let options = SyncOptions {
        dry_run: args.dry_run,
        import_only: args.import_only,
        from_main: args.from_main,
        message: args.message.clone(),
    };

    let coordinator = SyncCoordinator::new(&session.workspace, &session.cancel);
    let report = coordinator.sync(session.store.as_mut(), &options)?;

    if globals.json {
        print_json(&report)?;
        return Ok(());
    }
    if let Some(count) = report.merged_records {
        println!("Resolved log conflict: {count} record(s) merged");
    }
    if let Some(import) = &report.import {
        println!(
            "Imported: {} created, {} updated, {} unchanged, {} skipped",
            import.created, import.updated, import.unchanged, import.skipped
        );
    }
    match (report.committed, report.pulled, report.pushed) {
        (false, false, false) => println!("Already in sync"),
        (committed, pulled, pushed) => {
            let mut actions = Vec::new();
            if committed {
                actions.push("committed");
            }
            if pulled {
                actions.push("pulled");
            }
            if pushed {
                actions.push("pushed");
            }
            println!("Sync complete ({})", actions.join(", "));
        }
    }
    Ok(())
}

/// Export pending changes through the flush worker and commit, never
/// touching the remote.
fn flush_only(session: Session, args: &SyncArgs, globals: GlobalArgs) -> Result<()> {
    let Session {
        workspace,
        store,
        cancel,
    } = session;

    let debounce = workspace
        .config
        .flush_debounce_ms
        .map_or(DEFAULT_DEBOUNCE, std::time::Duration::from_millis);
    let scheduler = FlushScheduler::spawn(store, workspace.issues_path(), debounce);
    scheduler.flush_now()?;
    drop(scheduler);

    let coordinator = SyncCoordinator::new(&workspace, &cancel);
    let committed = if args.dry_run {
        false
    } else {
        coordinator.commit_log(args.message.as_deref())?
    };

    let report = SyncReport {
        committed,
        ..SyncReport::default()
    };
    if globals.json {
        print_json(&report)?;
    } else if committed {
        println!("Flushed and committed issue log");
    } else {
        println!("Nothing to flush");
    }
    Ok(())
}
