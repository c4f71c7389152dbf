/// Build identity reported by `--version`, the bootstrap log event, and the `build_info` metric.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("MEDIA_QUEUE_GIT_COMMIT_HASH");
pub const VERSION_WITH_COMMIT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+",
    env!("MEDIA_QUEUE_GIT_COMMIT_HASH")
);

const SHORT_HASH_LEN: usize = 12;

/// Returns the commit hash truncated for labels, or `"unknown"` when git was unavailable.
pub fn short_commit_hash() -> &'static str {
    GIT_COMMIT_HASH
        .get(..SHORT_HASH_LEN)
        .unwrap_or(GIT_COMMIT_HASH)
}
