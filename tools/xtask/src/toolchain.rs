//! Rust toolchain gate.

use anyhow::{Context, Result};
use std::path::Path;

/// Oldest compiler the workspace is built and released with.
pub const MIN_RUST_VERSION: (u64, u64, u64) = (1, 82, 0);

/// Parses `rustc --version` output such as `rustc 1.82.0 (f6e511eec 2024-10-15)`.
///
/// Pre-release suffixes (`-nightly`, `-beta.3`) are ignored.
pub fn parse_rustc_version(output: &str) -> Option<(u64, u64, u64)> {
    let mut words = output.split_whitespace();
    if words.next()? != "rustc" {
        return None;
    }
    let version = words.next()?.split('-').next()?;
    let mut parts = version.split('.').map(str::parse::<u64>);
    let major = parts.next()?.ok()?;
    let minor = parts.next()?.ok()?;
    let patch = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Fails unless `output` names a compiler at or above [`MIN_RUST_VERSION`].
pub fn ensure_supported(output: &str) -> Result<()> {
    let (major, minor, patch) = MIN_RUST_VERSION;
    let found = parse_rustc_version(output).with_context(|| {
        format!("Could not determine the Rust toolchain version from '{}'", output.trim())
    })?;
    if found < MIN_RUST_VERSION {
        anyhow::bail!(
            "Rust {}.{}.{} is not supported; the build requires Rust {major}.{minor}.{patch} or newer",
            found.0,
            found.1,
            found.2
        );
    }
    Ok(())
}

/// Checks the compiler on `PATH`.
pub fn check(root: &Path) -> Result<()> {
    let output = crate::capture_cmd(root, "rustc", &["--version"])?;
    ensure_supported(&output)?;
    println!("Toolchain: {}", output.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stable() {
        assert_eq!(
            parse_rustc_version("rustc 1.82.0 (f6e511eec 2024-10-15)\n"),
            Some((1, 82, 0))
        );
    }

    #[test]
    fn test_parse_prerelease() {
        assert_eq!(
            parse_rustc_version("rustc 1.85.0-nightly (4d296eabe 2024-12-15)"),
            Some((1, 85, 0))
        );
        assert_eq!(parse_rustc_version("rustc 1.84.0-beta.3 (abc 2024-12-01)"), Some((1, 84, 0)));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_rustc_version(""), None);
        assert_eq!(parse_rustc_version("cargo 1.82.0"), None);
        assert_eq!(parse_rustc_version("rustc one.two.three"), None);
        assert_eq!(parse_rustc_version("rustc 1.82"), None);
    }

    #[test]
    fn test_gate() {
        assert!(ensure_supported("rustc 1.82.0 (f6e511eec 2024-10-15)").is_ok());
        assert!(ensure_supported("rustc 2.0.0").is_ok());

        let err = ensure_supported("rustc 1.81.1 (eeb90cda1 2024-09-04)").unwrap_err();
        assert!(err.to_string().contains("Rust 1.81.1 is not supported"));

        let err = ensure_supported("not a compiler").unwrap_err();
        assert!(err.to_string().contains("Could not determine"));
    }
}
