//! Version information with embedded git metadata.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Placeholder vergen emits when git metadata is unavailable.
const IDEMPOTENT_PLACEHOLDER: &str = "VERGEN_IDEMPOTENT_OUTPUT";

/// Git branch at build time, or "unknown" if unavailable.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

/// Git commit SHA at build time, or "unknown" if unavailable.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Whether the working tree was dirty at build time.
pub fn git_dirty() -> bool {
    option_env!("VERGEN_GIT_DIRTY") == Some("true")
}

/// Whether the build carries real git metadata.
pub fn has_git_metadata() -> bool {
    GIT_SHA != "unknown" && GIT_SHA != IDEMPOTENT_PLACEHOLDER
}

/// Full version string: `{version}+{branch}.{sha}[.dirty]`, or just the
/// package version when built outside a git checkout.
///
/// Examples:
/// - `0.1.0+main.abc1234`
/// - `0.1.0+feature/foo.abc1234.dirty`
/// - `0.1.0`
pub fn version_string() -> String {
    if !has_git_metadata() {
        return PKG_VERSION.to_string();
    }
    let dirty_suffix = if git_dirty() { ".dirty" } else { "" };
    let short_sha: String = GIT_SHA.chars().take(7).collect();
    format!("{PKG_VERSION}+{GIT_BRANCH}.{short_sha}{dirty_suffix}")
}
