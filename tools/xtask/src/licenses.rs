//! License scanning and dependency license report.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Text that must not appear in files we ship.
const DISALLOWED_MARKERS: &[&str] = &[
    "GNU General Public License",
    "GNU Lesser General Public License",
    "GNU Affero General Public License",
    "SPDX-License-Identifier: GPL",
    "SPDX-License-Identifier: LGPL",
    "SPDX-License-Identifier: AGPL",
];

/// Paths (relative to the workspace root) never scanned. This file holds the
/// marker list itself.
const EXCLUDED_PATHS: &[&str] = &[
    "target",
    "distribution",
    "examples",
    ".git",
    "tools/xtask/src/licenses.rs",
];

/// Returns the first disallowed marker found in `text`.
pub fn find_disallowed(text: &str) -> Option<&'static str> {
    DISALLOWED_MARKERS
        .iter()
        .copied()
        .find(|marker| text.contains(marker))
}

fn is_excluded(relative: &Path) -> bool {
    EXCLUDED_PATHS
        .iter()
        .any(|excluded| relative.starts_with(excluded))
        || relative.extension().is_some_and(|extension| extension == "lock")
}

/// The subset of `.gitignore` syntax this repository uses: `/anchored`
/// paths, bare names matched at any depth, and `*.suffix` globs.
#[derive(Debug, Default)]
struct IgnoreRules {
    anchored: Vec<PathBuf>,
    names: Vec<String>,
    suffixes: Vec<String>,
}

impl IgnoreRules {
    fn load(root: &Path) -> Result<Self> {
        match std::fs::read_to_string(root.join(".gitignore")) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).context("Failed to read .gitignore"),
        }
    }

    fn parse(text: &str) -> Self {
        let mut rules = Self::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let pattern = line.trim_end_matches('/');
            if let Some(anchored) = pattern.strip_prefix('/') {
                rules.anchored.push(PathBuf::from(anchored));
            } else if let Some(suffix) = pattern.strip_prefix('*') {
                rules.suffixes.push(suffix.to_string());
            } else {
                rules.names.push(pattern.to_string());
            }
        }
        rules
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        if self.anchored.iter().any(|path| relative.starts_with(path)) {
            return true;
        }
        relative.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            self.names.iter().any(|ignored| *ignored == name)
                || self.suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
        })
    }
}

/// Files known to git when `root` is the top of a checkout.
fn tracked_files(root: &Path) -> Option<Vec<PathBuf>> {
    let toplevel = crate::capture_cmd(root, "git", &["rev-parse", "--show-toplevel"]).ok()?;
    let toplevel = std::fs::canonicalize(toplevel.trim()).ok()?;
    if toplevel != std::fs::canonicalize(root).ok()? {
        return None;
    }
    let listing = crate::capture_cmd(root, "git", &["ls-files", "-z"]).ok()?;
    Some(
        listing
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(PathBuf::from)
            .collect(),
    )
}

fn walked_files(root: &Path, rules: &IgnoreRules) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(root)
            .is_ok_and(|relative| !rules.is_ignored(relative) && !is_excluded(relative))
    });
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    Ok(files)
}

/// Scans the files git tracks under `root`, or every file not matched by
/// `.gitignore` outside a checkout. Binary files are skipped.
pub fn scan(root: &Path) -> Result<Vec<(PathBuf, &'static str)>> {
    let rules = IgnoreRules::load(root)?;
    let files = match tracked_files(root) {
        Some(files) => files,
        None => walked_files(root, &rules)?,
    };

    let mut violations = Vec::new();
    for relative in files {
        if is_excluded(&relative) || rules.is_ignored(&relative) {
            continue;
        }
        let path = root.join(&relative);
        if !path.is_file() {
            continue;
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };
        if let Some(marker) = find_disallowed(&text) {
            violations.push((relative, marker));
        }
    }
    violations.sort();
    Ok(violations)
}

/// Fails when any scanned file carries disallowed license text.
pub fn check(root: &Path) -> Result<()> {
    println!("Scanning for disallowed license text...");
    let violations = scan(root)?;
    if violations.is_empty() {
        println!("No disallowed license text found.");
        return Ok(());
    }
    for (path, marker) in &violations {
        eprintln!("  {}: contains '{marker}'", path.display());
    }
    anyhow::bail!("{} file(s) contain disallowed license text", violations.len());
}

/// Prints `name version license` for each third-party package.
pub fn report(root: &Path) -> Result<()> {
    let output = crate::capture_cmd(root, "cargo", &["metadata", "--format-version", "1"])?;
    let metadata: Value =
        serde_json::from_str(&output).context("Failed to parse cargo metadata output")?;
    for line in report_lines(&metadata)? {
        println!("{line}");
    }
    Ok(())
}

fn report_lines(metadata: &Value) -> Result<Vec<String>> {
    let members: HashSet<&str> = metadata
        .get("workspace_members")
        .and_then(Value::as_array)
        .context("cargo metadata has no workspace_members")?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let packages = metadata
        .get("packages")
        .and_then(Value::as_array)
        .context("cargo metadata has no packages")?;

    let mut lines = BTreeSet::new();
    for package in packages {
        let id = package.get("id").and_then(Value::as_str).unwrap_or_default();
        if members.contains(id) {
            continue;
        }
        let name = package.get("name").and_then(Value::as_str).unwrap_or_default();
        let version = package.get("version").and_then(Value::as_str).unwrap_or_default();
        let license = package
            .get("license")
            .and_then(Value::as_str)
            .filter(|license| !license.trim().is_empty())
            .unwrap_or("UNKNOWN");
        lines.insert(format!("{name} {version} {license}"));
    }
    Ok(lines.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_find_disallowed() {
        assert_eq!(find_disallowed("Licensed under the Apache License, Version 2.0"), None);
        assert_eq!(
            find_disallowed("// SPDX-License-Identifier: GPL-3.0-only"),
            Some("SPDX-License-Identifier: GPL")
        );
        assert_eq!(
            find_disallowed("under the terms of the GNU Affero General Public License"),
            Some("GNU Affero General Public License")
        );
    }

    #[test]
    fn test_scan_respects_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::create_dir_all(root.join("examples/vendor")).unwrap();

        fs::write(root.join("src/ok.rs"), "// Apache-2.0\n").unwrap();
        fs::write(root.join("src/bad.c"), "/* SPDX-License-Identifier: LGPL-2.1 */").unwrap();
        fs::write(root.join("src/blob.bin"), [0xff_u8, 0xfe, 0x00]).unwrap();
        fs::write(root.join("target/debug/out.txt"), "GNU General Public License").unwrap();
        fs::write(root.join("examples/vendor/x.rs"), "GNU General Public License").unwrap();
        fs::write(root.join("Cargo.lock"), "GNU General Public License").unwrap();

        let violations = scan(root).unwrap();
        assert_eq!(
            violations,
            vec![(PathBuf::from("src/bad.c"), "SPDX-License-Identifier: LGPL")]
        );
        assert!(check(root).is_err());

        fs::remove_file(root.join("src/bad.c")).unwrap();
        assert!(check(root).is_ok());
    }

    #[test]
    fn test_scan_honors_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("out/nested")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join(".gitignore"), "# local\n/out\n*.patch\nsecrets\n").unwrap();

        fs::write(root.join("out/nested/gen.txt"), "GNU General Public License").unwrap();
        fs::write(root.join("local.patch"), "GNU General Public License").unwrap();
        fs::write(root.join("src/secrets"), "GNU General Public License").unwrap();
        fs::write(root.join("src/lib.rs"), "GNU General Public License").unwrap();

        let violations = scan(root).unwrap();
        assert_eq!(
            violations,
            vec![(PathBuf::from("src/lib.rs"), "GNU General Public License")]
        );
    }

    #[test]
    fn test_ignore_rules_parse() {
        let rules = IgnoreRules::parse("/target\n*.db\nbuild/\n\n# c\n!keep\n");
        assert!(rules.is_ignored(Path::new("target/debug/x")));
        assert!(!rules.is_ignored(Path::new("crates/target.rs")));
        assert!(rules.is_ignored(Path::new("data/catalog.db")));
        assert!(rules.is_ignored(Path::new("tools/build/out")));
        assert!(!rules.is_ignored(Path::new("keep")));
    }

    #[test]
    fn test_workspace_is_clean() {
        let root = crate::workspace_root().unwrap();
        let violations = scan(&root).unwrap();
        assert!(violations.is_empty(), "disallowed license text in {violations:?}");
    }

    #[test]
    fn test_report_lines() {
        let metadata = json!({
            "workspace_members": ["path+file:///ws/crates/aurora-server#0.1.0"],
            "packages": [
                {"id": "path+file:///ws/crates/aurora-server#0.1.0", "name": "aurora-server", "version": "0.1.0", "license": "Apache-2.0"},
                {"id": "registry+serde@1.0.200", "name": "serde", "version": "1.0.200", "license": "MIT OR Apache-2.0"},
                {"id": "registry+axum@0.7.5", "name": "axum", "version": "0.7.5", "license": "MIT"},
                {"id": "registry+ring@0.17.8", "name": "ring", "version": "0.17.8", "license": null},
                {"id": "registry+axum@0.7.5#dup", "name": "axum", "version": "0.7.5", "license": "MIT"}
            ]
        });
        assert_eq!(
            report_lines(&metadata).unwrap(),
            vec![
                "axum 0.7.5 MIT".to_string(),
                "ring 0.17.8 UNKNOWN".to_string(),
                "serde 1.0.200 MIT OR Apache-2.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_report_lines_rejects_bad_metadata() {
        assert!(report_lines(&json!({"packages": []})).is_err());
        assert!(report_lines(&json!({"workspace_members": []})).is_err());
    }
}
