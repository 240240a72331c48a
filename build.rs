//! Build script for the TaskOrchard worker
//!
//! Embeds the git revision, build timestamp, target and compiler version
//! so `taskorchard-worker version` can report them.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = command_output("git", &["status", "--porcelain"]);
    let git_dirty = match git_dirty.as_deref() {
        Some("") => "false",
        Some(_) => "true",
        None => "unknown",
    };

    let vars = [
        ("TASKORCHARD_GIT_HASH", git_hash.unwrap_or_else(|| "unknown".to_string())),
        ("TASKORCHARD_GIT_DIRTY", git_dirty.to_string()),
        (
            "TASKORCHARD_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("TASKORCHARD_TARGET", env_or_unknown("TARGET")),
        ("TASKORCHARD_PROFILE", env_or_unknown("PROFILE")),
        (
            "TASKORCHARD_RUSTC_VERSION",
            command_output("rustc", &["--version"]).unwrap_or_else(|| "unknown".to_string()),
        ),
    ];

    for (key, value) in vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

fn env_or_unknown(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| "unknown".to_string())
}

/// Trimmed stdout of a successful command
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
}
