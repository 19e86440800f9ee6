use std::io::Read;
use std::str::FromStr;

use crate::cli::{GlobalArgs, ImportArgs};
use crate::engine::collision::DuplicateRefPolicy;
use crate::engine::import::{ImportOptions, ImportPipeline, OrphanPolicy};
use crate::error::Result;
use crate::format;

use super::{Session, print_json};

/// Execute the import command.
///
/// # Errors
///
/// Exit-code-1 failures: malformed input, collisions without
/// `--rename-on-import`, prefix mismatches, strict-mode validation.
pub fn execute(args: &ImportArgs, globals: GlobalArgs) -> Result<()> {
    let content = read_input(&args.path)?;
    let mut session = Session::open(globals.no_db)?;

    let orphans = match args.orphan_handling.as_deref() {
        Some(mode) => OrphanPolicy::from_str(mode)?,
        None => session
            .workspace
            .config
            .orphan_handling
            .as_deref()
            .map(OrphanPolicy::from_str)
            .transpose()?
            .unwrap_or_default(),
    };
    let options = ImportOptions {
        dry_run: args.dry_run,
        strict: args.strict,
        rename_on_import: args.rename_on_import,
        skip_existing: args.skip_existing,
        orphans,
        duplicate_refs: if args.clear_duplicate_external_refs {
            DuplicateRefPolicy::ClearDuplicates
        } else {
            DuplicateRefPolicy::Fail
        },
        actor: session.actor(),
    };

    let result =
        ImportPipeline::new(session.store.as_mut(), &session.cancel).run(&content, &options)?;
    if !args.dry_run {
        session.flush()?;
    }

    if globals.json {
        print_json(&result)?;
    } else {
        println!("{}", format::format_import_summary(&result));
    }
    Ok(())
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        Ok(content)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}
