use assert_cmd::Command;
use tempfile::TempDir;

/// A temporary directory with an initialized braid workspace in it.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let workspace = Self { dir };
        workspace.braid(&["init"]).assert().success();
        workspace
    }

    /// A command ready to run inside the workspace.
    pub fn braid(&self, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("braid").unwrap();
        cmd.current_dir(self.dir.path()).args(args);
        cmd
    }

    /// Run git inside the workspace, panicking on failure.
    #[allow(dead_code)]
    pub fn git(&self, args: &[&str]) {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(self.dir.path())
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    pub fn write_file(&self, name: &str, content: &str) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Issues currently visible to `list`, parsed from JSON output.
    pub fn list_json(&self, extra: &[&str]) -> serde_json::Value {
        let mut args = vec!["list", "--json"];
        args.extend_from_slice(extra);
        let output = self.braid(&args).assert().success().get_output().clone();
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

/// A JSONL record in the format the log uses.
pub fn record(id: &str, title: &str) -> String {
    format!(
        r#"{{"id":"{id}","title":"{title}","status":"open","priority":2,"issue_type":"task","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#
    )
}
