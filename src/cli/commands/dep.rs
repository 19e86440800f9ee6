use std::str::FromStr;

use braid_core::model::DependencyType;

use crate::cli::{DepSubcommand, GlobalArgs};
use crate::error::Result;

use super::{Session, print_json};

/// Execute a dep subcommand.
///
/// # Errors
///
/// Returns an error for unknown edge types, unresolvable IDs, or an
/// insertion that would close a blocking cycle.
pub fn execute(command: &DepSubcommand, globals: GlobalArgs) -> Result<()> {
    let mut session = Session::open(globals.no_db)?;
    match command {
        DepSubcommand::Add { from, to, type_ } => {
            let dep_type = DependencyType::from_str(type_)?;
            let actor = session.actor();
            let from = session.store.resolve_id(from)?;
            let to = session.store.resolve_id(to)?;
            session
                .store
                .add_dependency(&from, &to, dep_type.clone(), Some(&actor), true)?;
            session.flush()?;
            println!("Added {from} -[{}]-> {to}", dep_type.as_str());
        }
        DepSubcommand::Remove { from, to } => {
            let from = session.store.resolve_id(from)?;
            let to = session.store.resolve_id(to)?;
            session.store.remove_dependency(&from, &to)?;
            session.flush()?;
            println!("Removed {from} -> {to}");
        }
        DepSubcommand::Cycles => {
            let cycles = session.store.find_cycles()?;
            if globals.json {
                print_json(&cycles)?;
            } else if cycles.is_empty() {
                println!("No cycles in the blocking graph");
            } else {
                for cycle in &cycles {
                    println!("{}", cycle.join(" -> "));
                }
            }
        }
    }
    Ok(())
}
