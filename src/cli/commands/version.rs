//! Version command implementation.

use serde::Serialize;

use crate::cli::GlobalArgs;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rust_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
}

/// Execute the version command.
pub fn execute(globals: GlobalArgs) {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    // Absent when built from a source tarball; see build.rs.
    let commit = option_env!("VERGEN_GIT_SHA").filter(|s| !s.trim().is_empty());
    let branch = option_env!("VERGEN_GIT_BRANCH").filter(|s| !s.trim().is_empty());
    let rust_version = option_env!("VERGEN_RUSTC_SEMVER").filter(|s| !s.trim().is_empty());
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").filter(|s| !s.trim().is_empty());

    if globals.json {
        let output = VersionOutput {
            version,
            build,
            commit,
            branch,
            rust_version,
            target,
        };
        if let Ok(json) = serde_json::to_string_pretty(&output) {
            println!("{json}");
        }
        return;
    }

    println!("braid {version} ({build})");
    if let Some(commit) = commit {
        let short = &commit[..commit.len().min(12)];
        match branch {
            Some(branch) => println!("commit: {short} ({branch})"),
            None => println!("commit: {short}"),
        }
    }
    if let Some(rust_version) = rust_version {
        println!("rustc: {rust_version}");
    }
    if let Some(target) = target {
        println!("target: {target}");
    }
}
