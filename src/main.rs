//! `braid` - Git-native issue tracker
//!
//! JSONL log in git as source of truth, `SQLite` as a disposable local cache.
//! Non-invasive design: no git hooks, no daemon required.

use braid::run;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
