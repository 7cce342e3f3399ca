/// Build identity reported by `--version` and the logging bootstrap event.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("BRANCH_EXPORT_GIT_COMMIT_HASH");
pub const VERSION_WITH_COMMIT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+",
    env!("BRANCH_EXPORT_GIT_COMMIT_HASH")
);

/// First 12 characters of the commit hash, or `"unknown"`.
pub fn short_commit_hash() -> &'static str {
    GIT_COMMIT_HASH.get(..12).unwrap_or(GIT_COMMIT_HASH)
}

#[cfg(test)]
mod tests {
    use super::{short_commit_hash, VERSION, VERSION_WITH_COMMIT};

    #[test]
    fn version_with_commit_starts_with_semver() {
        assert!(VERSION_WITH_COMMIT.starts_with(VERSION));
        assert!(VERSION_WITH_COMMIT.contains('+'));
    }

    #[test]
    fn short_hash_is_bounded() {
        assert!(!short_commit_hash().is_empty());
        assert!(short_commit_hash().len() <= 12);
    }
}
