//! Git subprocess layer.
//!
//! Every operation is an external `git` invocation with explicit
//! arguments; nothing user-controlled ever passes through a shell. Calls
//! block the caller, but a supervisory timer warns on stderr when a
//! remote operation stalls (usually a hidden authentication prompt), and
//! a tripped [`CancelToken`] kills the child process.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use braid_core::error::{BraidError, Result};

use super::CancelToken;

/// How long a git call may run before the "check for an authentication
/// prompt" hint is printed.
const SLOW_WARN_AFTER: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct GitRunner {
    repo_root: PathBuf,
    slow_warn_after: Duration,
}

#[derive(Debug)]
struct GitOutput {
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl GitRunner {
    #[must_use]
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        Self {
            repo_root: repo_root.as_ref().to_path_buf(),
            slow_warn_after: SLOW_WARN_AFTER,
        }
    }

    /// Run git and return trimmed stdout. Non-zero exit is an error
    /// carrying git's stderr.
    ///
    /// # Errors
    ///
    /// Returns `Git`, `Cancelled`, or `Io`.
    pub fn run(&self, args: &[&str], cancel: &CancelToken) -> Result<String> {
        let output = self.execute(args, cancel)?;
        if output.code == Some(0) {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(git_error(args, &output))
        }
    }

    fn execute(&self, args: &[&str], cancel: &CancelToken) -> Result<GitOutput> {
        cancel.check()?;
        debug!(?args, "git");
        let mut child = Command::new("git")
            .arg("-C")
            .arg(&self.repo_root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Pipes have to be drained while waiting or a chatty child
        // deadlocks on a full buffer.
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let code = self.supervise(&mut child, args, cancel)?;
        Ok(GitOutput {
            code,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn supervise(
        &self,
        child: &mut Child,
        args: &[&str],
        cancel: &CancelToken,
    ) -> Result<Option<i32>> {
        let started = Instant::now();
        let mut warned = false;
        loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BraidError::Cancelled);
            }
            if let Some(status) = child.try_wait()? {
                return Ok(status.code());
            }
            if !warned && started.elapsed() >= self.slow_warn_after {
                warn!(
                    "git {} is taking a while; check for an authentication prompt",
                    args.first().copied().unwrap_or("")
                );
                warned = true;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    // === Repository inspection ===

    /// # Errors
    ///
    /// Returns `Git` when not on a branch (detached HEAD).
    pub fn current_branch(&self, cancel: &CancelToken) -> Result<String> {
        self.run(&["symbolic-ref", "--short", "HEAD"], cancel)
    }

    /// # Errors
    ///
    /// Returns `Git` when the ref does not resolve.
    pub fn rev_parse(&self, reference: &str, cancel: &CancelToken) -> Result<String> {
        self.run(&["rev-parse", "--verify", reference], cancel)
    }

    #[must_use]
    pub fn ref_exists(&self, reference: &str, cancel: &CancelToken) -> bool {
        self.rev_parse(reference, cancel).is_ok()
    }

    /// `git merge-base --is-ancestor a b`: exit 0 means yes, 1 means no,
    /// anything else is a real failure.
    ///
    /// # Errors
    ///
    /// Returns `Git` on lookup failure.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str, cancel: &CancelToken) -> Result<bool> {
        let args = ["merge-base", "--is-ancestor", ancestor, descendant];
        let output = self.execute(&args, cancel)?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(git_error(&args, &output)),
        }
    }

    /// Porcelain status limited to `paths` (empty means the whole tree).
    ///
    /// # Errors
    ///
    /// Returns `Git` on failure.
    pub fn status_porcelain(&self, paths: &[&str], cancel: &CancelToken) -> Result<String> {
        let mut args = vec!["status", "--porcelain", "--"];
        args.extend_from_slice(paths);
        self.run(&args, cancel)
    }

    /// Content of `path` at `reference` (e.g. a branch, or a merge stage
    /// like `:1:`). `None` when the object does not exist there.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `Io`.
    pub fn show(&self, reference: &str, path: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        let spec = format!("{reference}:{path}");
        let args = ["show", spec.as_str()];
        let output = self.execute(&args, cancel)?;
        if output.code == Some(0) {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }

    /// Merge-index stage of `path`: 1 = common ancestor, 2 = ours,
    /// 3 = theirs.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `Io`.
    pub fn show_stage(&self, stage: u8, path: &str, cancel: &CancelToken) -> Result<Option<Vec<u8>>> {
        self.show(&format!(":{stage}"), path, cancel)
    }

    // === Working tree and index ===

    /// # Errors
    ///
    /// Returns `Git` on failure.
    pub fn add(&self, paths: &[&str], cancel: &CancelToken) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run(&args, cancel).map(|_| ())
    }

    /// Restore `paths` in the working tree from `reference`.
    ///
    /// # Errors
    ///
    /// Returns `Git` on failure.
    pub fn checkout_paths(&self, reference: &str, paths: &[&str], cancel: &CancelToken) -> Result<()> {
        let mut args = vec!["checkout", reference, "--"];
        args.extend_from_slice(paths);
        self.run(&args, cancel).map(|_| ())
    }

    /// Commit restricted to an explicit pathspec so unrelated staged
    /// changes are never swept in.
    ///
    /// # Errors
    ///
    /// Returns `Git` on failure.
    pub fn commit_paths(
        &self,
        message: &str,
        paths: &[&str],
        author: Option<&str>,
        no_gpg_sign: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut args = vec!["commit", "-m", message];
        if let Some(author) = author {
            args.push("--author");
            args.push(author);
        }
        if no_gpg_sign {
            args.push("--no-gpg-sign");
        }
        args.push("--");
        args.extend_from_slice(paths);
        self.run(&args, cancel).map(|_| ())
    }

    // === Remote operations ===

    /// # Errors
    ///
    /// Returns `Git` on failure.
    pub fn fetch(&self, remote: &str, branch: &str, cancel: &CancelToken) -> Result<()> {
        self.run(&["fetch", remote, branch], cancel).map(|_| ())
    }

    /// # Errors
    ///
    /// Returns `Git` on failure.
    pub fn push(&self, remote: &str, branch: &str, cancel: &CancelToken) -> Result<()> {
        self.run(&["push", remote, branch], cancel).map(|_| ())
    }

    /// # Errors
    ///
    /// Returns `Git` on failure (including merge conflicts, which the
    /// caller inspects via conflict markers).
    pub fn pull(&self, remote: &str, branch: &str, cancel: &CancelToken) -> Result<()> {
        self.run(&["pull", "--no-rebase", remote, branch], cancel)
            .map(|_| ())
    }

    /// Whether the current branch has an upstream tracking ref.
    #[must_use]
    pub fn has_upstream(&self, cancel: &CancelToken) -> bool {
        self.run(
            &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
            cancel,
        )
        .is_ok()
    }

    /// Name of the default branch (`main` or `master`), if either exists.
    #[must_use]
    pub fn default_branch(&self, cancel: &CancelToken) -> Option<String> {
        ["main", "master"]
            .into_iter()
            .find(|b| self.ref_exists(&format!("refs/heads/{b}"), cancel))
            .map(String::from)
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        buf
    })
}

fn git_error(args: &[&str], output: &GitOutput) -> BraidError {
    let op = args.first().copied().unwrap_or("").to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim();
    BraidError::Git {
        op,
        message: if message.is_empty() {
            format!("exit code {:?}", output.code)
        } else {
            message.to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) -> GitRunner {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .arg("-C")
                .arg(dir)
                .args(args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "-q", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        GitRunner::new(dir)
    }

    fn commit_file(dir: &Path, git: &GitRunner, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
        let cancel = CancelToken::new();
        git.add(&[name], &cancel).unwrap();
        git.commit_paths("commit", &[name], None, true, &cancel).unwrap();
    }

    #[test]
    fn branch_and_rev_parse() {
        let dir = tempdir().unwrap();
        let git = init_repo(dir.path());
        commit_file(dir.path(), &git, "a.txt", "hello\n");

        let cancel = CancelToken::new();
        assert_eq!(git.current_branch(&cancel).unwrap(), "main");
        assert!(git.rev_parse("HEAD", &cancel).is_ok());
        assert!(git.rev_parse("no-such-ref", &cancel).is_err());
    }

    #[test]
    fn ancestor_test_distinguishes_exit_codes() {
        let dir = tempdir().unwrap();
        let git = init_repo(dir.path());
        commit_file(dir.path(), &git, "a.txt", "one\n");
        let cancel = CancelToken::new();
        let first = git.rev_parse("HEAD", &cancel).unwrap();
        commit_file(dir.path(), &git, "a.txt", "two\n");
        let second = git.rev_parse("HEAD", &cancel).unwrap();

        assert!(git.is_ancestor(&first, &second, &cancel).unwrap());
        assert!(!git.is_ancestor(&second, &first, &cancel).unwrap());
    }

    #[test]
    fn show_returns_none_for_missing_object() {
        let dir = tempdir().unwrap();
        let git = init_repo(dir.path());
        commit_file(dir.path(), &git, "a.txt", "content\n");

        let cancel = CancelToken::new();
        let found = git.show("HEAD", "a.txt", &cancel).unwrap();
        assert_eq!(found.as_deref(), Some(b"content\n".as_slice()));
        assert!(git.show("HEAD", "missing.txt", &cancel).unwrap().is_none());
    }

    #[test]
    fn pathspec_commit_leaves_other_staged_files_alone() {
        let dir = tempdir().unwrap();
        let git = init_repo(dir.path());
        commit_file(dir.path(), &git, "a.txt", "a\n");

        let cancel = CancelToken::new();
        std::fs::write(dir.path().join("a.txt"), "a2\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b\n").unwrap();
        git.add(&["a.txt", "b.txt"], &cancel).unwrap();
        git.commit_paths("only a", &["a.txt"], None, true, &cancel).unwrap();

        let status = git.status_porcelain(&[], &cancel).unwrap();
        assert!(status.contains("b.txt"));
        assert!(!status.contains("a.txt"));
    }

    #[test]
    fn cancelled_token_stops_before_spawn() {
        let dir = tempdir().unwrap();
        let git = init_repo(dir.path());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = git.current_branch(&cancel);
        assert!(matches!(result, Err(BraidError::Cancelled)));
    }
}
