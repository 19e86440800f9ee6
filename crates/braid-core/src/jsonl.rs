//! JSONL codec for the issue log.
//!
//! One complete [`Issue`] per line, relations embedded. Saves are atomic
//! (write to `.tmp`, then rename) and preserve the order the caller
//! provides; the log's on-disk order is meaningful to the prune routine.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{BraidError, Result};
use crate::model::Issue;

/// Load issues from a JSONL file, in file order.
///
/// Empty lines are skipped. A malformed line is fatal for the whole load;
/// byte-level corruption is worth surfacing immediately rather than
/// recovering a partial batch.
///
/// # Errors
///
/// Returns `FileNotFound`/`Io` if the file cannot be read, or `JsonlParse`
/// naming the 1-based line on invalid JSON.
pub fn load(path: &Path) -> Result<Vec<Issue>> {
    let file = fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BraidError::FileNotFound(path.to_path_buf())
        } else {
            BraidError::Io(e)
        }
    })?;
    let reader = BufReader::new(file);

    let mut issues = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let issue: Issue = serde_json::from_str(trimmed).map_err(|e| BraidError::JsonlParse {
            line: line_num + 1,
            reason: e.to_string(),
        })?;
        issues.push(issue);
    }

    Ok(issues)
}

/// Parse issues from in-memory JSONL content (same rules as [`load`]).
///
/// # Errors
///
/// Returns `JsonlParse` naming the 1-based line on invalid JSON.
pub fn parse(content: &str) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let issue: Issue = serde_json::from_str(trimmed).map_err(|e| BraidError::JsonlParse {
            line: line_num + 1,
            reason: e.to_string(),
        })?;
        issues.push(issue);
    }
    Ok(issues)
}

/// Save issues to a JSONL file, one line per issue, in the given order.
///
/// Writes to `<path>.tmp` and renames into place so a crash mid-write
/// never truncates the log.
///
/// # Errors
///
/// Returns `Io` on write failure or `Json` if serialization fails.
pub fn save(path: &Path, issues: &[Issue]) -> Result<()> {
    let tmp_path = path.with_extension("jsonl.tmp");
    let mut file = fs::File::create(&tmp_path)?;

    for issue in issues {
        let json = serde_json::to_string(issue)?;
        writeln!(file, "{json}")?;
    }

    file.flush()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Scan a file's raw bytes for git conflict markers.
///
/// Markers count only at the start of a line: `<<<<<<< `, a line that is
/// exactly `=======`, or `>>>>>>> `. Scanning the undecoded byte stream
/// means marker-like substrings inside JSON string fields never trigger a
/// false positive — a real marker splits the line structure itself.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read.
pub fn has_conflict_markers(path: &Path) -> Result<bool> {
    let bytes = fs::read(path)?;
    Ok(bytes_have_conflict_markers(&bytes))
}

#[must_use]
pub fn bytes_have_conflict_markers(bytes: &[u8]) -> bool {
    bytes.split(|&b| b == b'\n').any(|line| {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        line.starts_with(b"<<<<<<< ") || line == b"=======" || line.starts_with(b">>>>>>> ")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Status};
    use chrono::Utc;

    fn sample(id: &str, title: &str) -> Issue {
        Issue {
            id: id.to_string(),
            title: title.to_string(),
            status: Status::Open,
            priority: Priority::MEDIUM,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");

        let issues = vec![sample("bi-zz", "Last alphabetically"), sample("bi-aa", "First")];
        save(&path, &issues).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "bi-zz");
        assert_eq!(loaded[1].id, "bi-aa");
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let result = load(Path::new("/nonexistent/issues.jsonl"));
        assert!(matches!(result, Err(BraidError::FileNotFound(_))));
    }

    #[test]
    fn load_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blanks.jsonl");
        let json = serde_json::to_string(&sample("bi-123", "Test")).unwrap();
        fs::write(&path, format!("\n{json}\n\n")).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn malformed_line_is_fatal_with_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        let json = serde_json::to_string(&sample("bi-ok", "Fine")).unwrap();
        fs::write(&path, format!("{json}\n{{not json\n")).unwrap();

        match load(&path) {
            Err(BraidError::JsonlParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected JsonlParse, got {other:?}"),
        }
    }

    #[test]
    fn conflict_markers_detected_at_line_start_only() {
        assert!(bytes_have_conflict_markers(b"<<<<<<< HEAD\nx\n"));
        assert!(bytes_have_conflict_markers(b"a\n=======\nb\n"));
        assert!(bytes_have_conflict_markers(b">>>>>>> branch\n"));
        // Marker text inside a JSON string is not a conflict.
        assert!(!bytes_have_conflict_markers(
            br#"{"title":"docs about <<<<<<< markers"}"#
        ));
        assert!(!bytes_have_conflict_markers(b"prefix =======\n"));
    }

    #[test]
    fn conflict_markers_tolerate_crlf() {
        assert!(bytes_have_conflict_markers(b"a\r\n=======\r\nb\r\n"));
    }
}
