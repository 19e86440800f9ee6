use crate::cli::{GlobalArgs, InitArgs};
use crate::config::Workspace;
use crate::error::{BraidError, Result};
use crate::storage::{SqliteStorage, Storage};

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` without `--force`, or any I/O failure.
pub fn execute(args: &InitArgs, globals: GlobalArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let workspace = match Workspace::init(&cwd, &args.prefix) {
        Ok(workspace) => workspace,
        Err(BraidError::AlreadyInitialized { .. }) if args.force => {
            let mut workspace = Workspace::open(&cwd)?;
            workspace.config.prefix = Some(args.prefix.clone());
            workspace.save_config()?;
            workspace
        }
        Err(e) => return Err(e),
    };

    if !globals.no_db && !workspace.no_db() {
        let mut cache = SqliteStorage::open(workspace.cache_path())?;
        cache.set_config("prefix", &args.prefix)?;
    }

    println!(
        "Initialized braid workspace at {} (prefix '{}')",
        workspace.braid_dir().display(),
        args.prefix
    );
    Ok(())
}
