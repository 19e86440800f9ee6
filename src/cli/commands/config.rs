use crate::cli::{ConfigSubcommand, GlobalArgs};
use crate::error::{BraidError, Result};

use super::Session;

/// Keys the config surface accepts. Everything else is a typo until
/// proven otherwise.
const KNOWN_KEYS: [&str; 5] = [
    "prefix",
    "sync_branch",
    "remote",
    "actor",
    "tombstone_ttl_days",
];

/// Execute a config subcommand against the store's config table.
///
/// # Errors
///
/// Returns `Config` for unknown keys.
pub fn execute(command: &ConfigSubcommand, globals: GlobalArgs) -> Result<()> {
    let mut session = Session::open(globals.no_db)?;
    match command {
        ConfigSubcommand::Get { key } => {
            check_key(key)?;
            match session.store.get_config(key)? {
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
        }
        ConfigSubcommand::Set { key, value } => {
            check_key(key)?;
            session.store.set_config(key, value)?;
            println!("{key} = {value}");
        }
        ConfigSubcommand::List => {
            for key in KNOWN_KEYS {
                if let Some(value) = session.store.get_config(key)? {
                    println!("{key} = {value}");
                }
            }
        }
    }
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if KNOWN_KEYS.contains(&key) {
        Ok(())
    } else {
        Err(BraidError::Config(format!(
            "unknown config key '{key}' (known: {})",
            KNOWN_KEYS.join(", ")
        )))
    }
}
