//! Output formatting.
//!
//! Human-readable text on stdout; `--json` callers get serde-serialized
//! structures instead and never mix the two on one stream.

mod text;

pub use text::{
    format_import_summary, format_issue_details, format_issue_line, format_issue_table,
    format_priority, format_prune_summary, format_status_icon, format_type_badge,
};
