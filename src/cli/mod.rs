//! Command-line interface for `braid`.
//!
//! Parsing and routing with clap; each command lives in its own module
//! under [`commands`].

pub mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::error::Result;
use crate::logging::{self, Verbosity};

/// `braid` - git-backed issue tracker.
#[derive(Parser, Debug)]
#[command(name = "braid")]
#[command(
    author,
    version,
    about = "Git-backed issue tracker (JSONL log + SQLite cache)",
    long_about = None,
    after_help = "The JSONL log under .braid/ is the source of truth; the cache is disposable."
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Output JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Operate without `SQLite` (JSONL-only mode)
    #[arg(long, global = true)]
    pub no_db: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct GlobalArgs {
    pub json: bool,
    pub no_db: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a braid workspace
    Init(InitArgs),

    /// Create a new issue
    Create(CreateArgs),

    /// Update an existing issue
    Update(UpdateArgs),

    /// Close one or more issues
    Close(CloseArgs),

    /// Delete (tombstone) one or more issues
    Delete(DeleteArgs),

    /// List issues
    List(ListArgs),

    /// Show issue details
    Show(ShowArgs),

    /// Manage dependencies
    Dep(DepCommand),

    /// Import issues from a JSONL file
    Import(ImportArgs),

    /// Synchronize the issue log with git
    Sync(SyncArgs),

    /// Compact the log (prune expired tombstones)
    Compact(CompactArgs),

    /// Read/write configuration
    Config(ConfigCommand),

    /// Generate shell completions
    Completions(CompletionsArgs),

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Namespace prefix for generated identifiers
    #[arg(long, default_value = "bi")]
    pub prefix: String,

    /// Reinitialize an existing workspace
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Issue title
    pub title: Option<String>,

    /// Issue title (flag form)
    #[arg(long = "title")]
    pub title_flag: Option<String>,

    /// Description text
    #[arg(short, long)]
    pub description: Option<String>,

    /// Priority: 0-4 or critical/high/medium/low/backlog
    #[arg(short, long)]
    pub priority: Option<String>,

    /// Issue type: task/bug/feature/epic/chore
    #[arg(short = 't', long = "type")]
    pub type_: Option<String>,

    /// Assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Labels to attach (repeatable)
    #[arg(short, long)]
    pub label: Vec<String>,

    /// External reference (e.g. JIRA-123)
    #[arg(long)]
    pub external_ref: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Issue ID (or unambiguous suffix)
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    /// New description; empty string clears it
    #[arg(short, long)]
    pub description: Option<String>,

    #[arg(long)]
    pub design: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,

    /// New status: open/in_progress/blocked/deferred/closed
    #[arg(short, long)]
    pub status: Option<String>,

    #[arg(short, long)]
    pub priority: Option<String>,

    #[arg(short = 't', long = "type")]
    pub type_: Option<String>,

    /// New assignee; empty string clears it
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Defer until (RFC 3339); empty string clears it
    #[arg(long)]
    pub defer_until: Option<String>,
}

#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Issue IDs to close
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Reason recorded on the issue
    #[arg(short, long)]
    pub reason: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Issue IDs to tombstone
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Reason recorded on the tombstone
    #[arg(short, long)]
    pub reason: Option<String>,
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ListArgs {
    /// Filter by status (repeatable)
    #[arg(short, long)]
    pub status: Vec<String>,

    /// Filter by type (repeatable)
    #[arg(short = 't', long = "type")]
    pub type_: Vec<String>,

    /// Filter by priority (repeatable)
    #[arg(short, long)]
    pub priority: Vec<String>,

    /// Filter by assignee
    #[arg(short, long)]
    pub assignee: Option<String>,

    /// Substring match against titles
    #[arg(long)]
    pub title: Option<String>,

    /// Require all of these labels (repeatable)
    #[arg(short, long)]
    pub label: Vec<String>,

    /// Include closed issues
    #[arg(long)]
    pub all: bool,

    /// Include deferred issues
    #[arg(long)]
    pub deferred: bool,

    /// Limit the number of results
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Issue ID (or unambiguous suffix)
    pub id: String,
}

#[derive(Args, Debug)]
pub struct DepCommand {
    #[command(subcommand)]
    pub command: DepSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum DepSubcommand {
    /// Add a dependency edge
    Add {
        /// Issue that depends
        from: String,
        /// Issue depended on
        to: String,
        /// Edge type: blocks/related/parent-child/discovered-from/replies-to
        #[arg(short = 't', long = "type", default_value = "blocks")]
        type_: String,
    },

    /// Remove a dependency edge
    Remove { from: String, to: String },

    /// Detect cycles in the blocking graph
    Cycles,
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ImportArgs {
    /// JSONL file to import ("-" for stdin)
    pub path: String,

    /// Classify without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Treat validation failures as fatal
    #[arg(long)]
    pub strict: bool,

    /// Rename foreign-prefixed and collided identifiers
    #[arg(long)]
    pub rename_on_import: bool,

    /// Orphaned-edge policy: strict/resurrect/skip/allow
    #[arg(long)]
    pub orphan_handling: Option<String>,

    /// Keep the first record per duplicated external_ref, clear the rest
    #[arg(long)]
    pub clear_duplicate_external_refs: bool,

    /// Leave records whose identifier already exists untouched
    #[arg(long)]
    pub skip_existing: bool,
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct SyncArgs {
    /// One-directional sync from the default branch
    #[arg(long)]
    pub from_main: bool,

    /// Report without committing, pulling, or pushing
    #[arg(long)]
    pub dry_run: bool,

    /// Only bring remote changes into the cache
    #[arg(long)]
    pub import_only: bool,

    /// Export pending changes and commit, without pulling or pushing
    #[arg(long, conflicts_with = "import_only")]
    pub flush_only: bool,

    /// Commit message override
    #[arg(short, long)]
    pub message: Option<String>,
}

#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Prune tombstones past their time-to-live
    #[arg(long)]
    pub prune: bool,

    /// Override the TTL in days
    #[arg(long)]
    pub older_than: Option<i64>,

    /// Preview without rewriting the log
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Get a config value
    Get { key: String },

    /// Set a config value
    Set { key: String, value: String },

    /// List config values
    List,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Parse arguments and run the selected command.
///
/// # Errors
///
/// Propagates whatever the command returns; `main` turns it into exit
/// code 1.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.quiet, cli.verbose));

    let globals = GlobalArgs {
        json: cli.json,
        no_db: cli.no_db,
    };

    match cli.command {
        Commands::Init(args) => commands::init::execute(&args, globals),
        Commands::Create(args) => commands::create::execute(args, globals),
        Commands::Update(args) => commands::update::execute(&args, globals),
        Commands::Close(args) => commands::close::execute(&args, globals),
        Commands::Delete(args) => commands::delete::execute(&args, globals),
        Commands::List(args) => commands::list::execute(&args, globals),
        Commands::Show(args) => commands::show::execute(&args, globals),
        Commands::Dep(args) => commands::dep::execute(&args.command, globals),
        Commands::Import(args) => commands::import::execute(&args, globals),
        Commands::Sync(args) => commands::sync::execute(&args, globals),
        Commands::Compact(args) => commands::compact::execute(&args, globals),
        Commands::Config(args) => commands::config::execute(&args.command, globals),
        Commands::Completions(args) => {
            commands::completions::execute(args.shell);
            Ok(())
        }
        Commands::Version => {
            commands::version::execute(globals);
            Ok(())
        }
    }
}
