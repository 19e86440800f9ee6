mod common;

use common::Workspace;
use predicates::str::contains;

fn first_id(workspace: &Workspace) -> String {
    workspace.list_json(&[])[0]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn create_list_show_update_close_round_trip() {
    let workspace = Workspace::new();
    workspace
        .braid(&["create", "Fix the flaky widget", "-p", "1", "-t", "bug"])
        .assert()
        .success()
        .stdout(contains("Created"));

    workspace
        .braid(&["list"])
        .assert()
        .success()
        .stdout(contains("Fix the flaky widget"));

    let id = first_id(&workspace);
    assert!(id.starts_with("bi-"), "unexpected id {id}");

    workspace
        .braid(&["show", &id])
        .assert()
        .success()
        .stdout(contains("Fix the flaky widget"));

    workspace
        .braid(&["update", &id, "--status", "in_progress", "-a", "alice"])
        .assert()
        .success()
        .stdout(contains("Updated"));

    let issues = workspace.list_json(&[]);
    assert_eq!(issues[0]["status"], "in_progress");
    assert_eq!(issues[0]["assignee"], "alice");

    workspace
        .braid(&["close", &id, "--reason", "fixed"])
        .assert()
        .success()
        .stdout(contains("Closed"));

    workspace
        .braid(&["list"])
        .assert()
        .success()
        .stdout(contains("No issues found"));
    workspace
        .braid(&["list", "--all"])
        .assert()
        .success()
        .stdout(contains("Fix the flaky widget"));
}

#[test]
fn blocking_cycle_is_rejected() {
    let workspace = Workspace::new();
    for title in ["Alpha", "Beta", "Gamma"] {
        workspace.braid(&["create", title]).assert().success();
    }
    let issues = workspace.list_json(&[]);
    let ids: Vec<String> = issues
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect();

    workspace
        .braid(&["dep", "add", &ids[0], &ids[1]])
        .assert()
        .success();
    workspace
        .braid(&["dep", "add", &ids[1], &ids[2]])
        .assert()
        .success();
    workspace
        .braid(&["dep", "add", &ids[2], &ids[0]])
        .assert()
        .failure()
        .stderr(contains("cycle"));

    // The rejected edge left no trace.
    workspace
        .braid(&["dep", "cycles"])
        .assert()
        .success()
        .stdout(contains("No cycles"));
}

#[test]
fn delete_then_prune_removes_the_record() {
    let workspace = Workspace::new();
    workspace
        .braid(&["create", "Doomed issue"])
        .assert()
        .success();
    let id = first_id(&workspace);

    workspace
        .braid(&["delete", &id])
        .assert()
        .success()
        .stdout(contains("tombstoned"));

    // Preview first; the tombstone survives it.
    workspace
        .braid(&["compact", "--prune", "--older-than", "0", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("Would prune 1"));
    let log = std::fs::read_to_string(workspace.dir.path().join(".braid/issues.jsonl")).unwrap();
    assert!(log.contains(&id));

    workspace
        .braid(&["compact", "--prune", "--older-than", "0"])
        .assert()
        .success()
        .stdout(contains("Pruned 1"));
    let log = std::fs::read_to_string(workspace.dir.path().join(".braid/issues.jsonl")).unwrap();
    assert!(!log.contains(&id));

    workspace
        .braid(&["list", "--all"])
        .assert()
        .success()
        .stdout(contains("No issues found"));
}

#[test]
fn fresh_tombstone_survives_default_ttl() {
    let workspace = Workspace::new();
    workspace.braid(&["create", "Just deleted"]).assert().success();
    let id = first_id(&workspace);
    workspace.braid(&["delete", &id]).assert().success();

    workspace
        .braid(&["compact", "--prune"])
        .assert()
        .success()
        .stdout(contains("No tombstones older than 30 day(s)"));
}

#[test]
fn config_round_trip() {
    let workspace = Workspace::new();
    workspace
        .braid(&["config", "set", "sync_branch", "braid-sync"])
        .assert()
        .success();
    workspace
        .braid(&["config", "get", "sync_branch"])
        .assert()
        .success()
        .stdout(contains("braid-sync"));
    workspace
        .braid(&["config", "set", "bogus_key", "x"])
        .assert()
        .failure()
        .stderr(contains("unknown config key"));
}

#[test]
fn no_db_mode_works_end_to_end() {
    let workspace = Workspace::new();
    workspace
        .braid(&["--no-db", "create", "Memory only"])
        .assert()
        .success();
    workspace
        .braid(&["--no-db", "list"])
        .assert()
        .success()
        .stdout(contains("Memory only"));
    // The log is the shared truth; the cached backend sees it too.
    workspace
        .braid(&["list"])
        .assert()
        .success()
        .stdout(contains("Memory only"));
}

#[test]
fn outside_workspace_fails_with_guidance() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut cmd = assert_cmd::Command::cargo_bin("braid").unwrap();
    cmd.current_dir(dir.path())
        .args(["list"])
        .assert()
        .failure()
        .stderr(contains("braid init"));
}

#[test]
fn sync_flush_only_commits_without_a_remote() {
    let workspace = Workspace::new();
    workspace.git(&["init", "-b", "main"]);
    workspace.git(&["config", "user.name", "Test"]);
    workspace.git(&["config", "user.email", "test@example.com"]);
    workspace.git(&["config", "commit.gpgsign", "false"]);

    workspace
        .braid(&["create", "Flush me"])
        .assert()
        .success();

    workspace
        .braid(&["sync", "--flush-only"])
        .assert()
        .success()
        .stdout(contains("Flushed and committed"));

    let out = std::process::Command::new("git")
        .arg("-C")
        .arg(workspace.dir.path())
        .args(["show", "--name-only", "--format=", "HEAD"])
        .output()
        .unwrap();
    let files = String::from_utf8(out.stdout).unwrap();
    assert!(files.contains(".braid/issues.jsonl"), "log not committed: {files}");

    // Nothing new to flush on the second run.
    workspace
        .braid(&["sync", "--flush-only"])
        .assert()
        .success()
        .stdout(contains("Nothing to flush"));
}

#[test]
fn create_rejects_malformed_label() {
    let workspace = Workspace::new();
    let long = format!("has spaces, punctuation! {}", "x".repeat(80));
    workspace
        .braid(&["create", "Labelled issue", "-l", &long])
        .assert()
        .failure()
        .stderr(contains("label"));

    workspace
        .braid(&["list"])
        .assert()
        .success()
        .stdout(contains("No issues found"));
}
