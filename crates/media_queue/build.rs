use std::process::Command;

const COMMIT_ENV: &str = "MEDIA_QUEUE_GIT_COMMIT_HASH";
const FALLBACK_COMMIT: &str = "unknown";

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_COMMIT_HASH");
    for head in [".git/HEAD", "../.git/HEAD", "../../.git/HEAD"] {
        println!("cargo:rerun-if-changed={head}");
    }

    let commit = std::env::var("SOURCE_COMMIT_HASH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(git_head)
        .unwrap_or_else(|| FALLBACK_COMMIT.to_string());

    println!("cargo:rustc-env={COMMIT_ENV}={}", commit.trim());
}

fn git_head() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;

    String::from_utf8(output.stdout)
        .ok()
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
}
