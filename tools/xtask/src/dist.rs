//! Distribution layout, tarball and checksum.
//!
//! ```text
//! distribution/
//!   package/                      compile-distribution
//!     bin/      aurora-iceberg-rest, aurora-iceberg-rest.sh
//!     conf/     aurora.conf
//!     scripts/
//!     libs/
//!     licenses/ LICENSE, NOTICE
//!   aurora-<version>-bin.tar.gz   assemble-distribution
//!   aurora-<version>-bin.tar.gz.sha256
//! ```

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::{run_cmd, toolchain};

const DIST_DIR: &str = "distribution";
const PACKAGE_DIR: &str = "package";
const SERVER_BINARY: &str = "aurora-iceberg-rest";
const LAUNCHER: &str = "aurora-iceberg-rest.sh";
const CONF_TEMPLATE: &str = "conf/aurora.conf.template";
const SERVER_MANIFEST: &str = "crates/aurora-server/Cargo.toml";
const LICENSE_FILES: &[&str] = &["LICENSE", "NOTICE"];

/// Artifacts written by [`assemble`].
#[derive(Debug)]
pub struct Artifacts {
    pub tarball: PathBuf,
    pub checksum: PathBuf,
}

impl Artifacts {
    /// Paths of the tarball and checksum for `version`.
    pub fn locate(root: &Path, version: &str) -> Self {
        let dist = root.join(DIST_DIR);
        let name = artifact_name(version);
        Self {
            tarball: dist.join(format!("{name}.tar.gz")),
            checksum: dist.join(format!("{name}.tar.gz.sha256")),
        }
    }
}

/// Builds the release binary and lays out `distribution/package`.
pub fn compile(root: &Path) -> Result<()> {
    toolchain::check(root)?;
    run_cmd(root, "cargo", &["build", "--release", "-p", "aurora-server"])?;

    let package = root.join(DIST_DIR).join(PACKAGE_DIR);
    if package.exists() {
        fs::remove_dir_all(&package)
            .with_context(|| format!("Failed to remove {}", package.display()))?;
    }
    for dir in ["bin", "conf", "scripts", "libs", "licenses"] {
        fs::create_dir_all(package.join(dir))?;
    }

    let binary = format!("{SERVER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    copy(
        &root.join("target/release").join(&binary),
        &package.join("bin").join(&binary),
    )?;
    copy(&root.join("bin").join(LAUNCHER), &package.join("bin").join(LAUNCHER))?;
    make_executable(&package.join("bin").join(LAUNCHER))?;
    copy(&root.join(CONF_TEMPLATE), &package.join("conf/aurora.conf"))?;
    copy_tree(&root.join("scripts"), &package.join("scripts"))?;
    for name in LICENSE_FILES {
        let source = root.join(name);
        if source.is_file() {
            copy(&source, &package.join("licenses").join(name))?;
        }
    }

    println!("\nDistribution laid out in {}", package.display());
    Ok(())
}

/// Runs [`compile`] and packs the result as `aurora-<version>-bin.tar.gz`.
pub fn assemble(root: &Path) -> Result<Artifacts> {
    compile(root)?;

    let version = read_version(root)?;
    let dist = root.join(DIST_DIR);
    let name = artifact_name(&version);
    let staged = dist.join(&name);
    let artifacts = Artifacts::locate(root, &version);

    if staged.exists() {
        fs::remove_dir_all(&staged)?;
    }
    fs::rename(dist.join(PACKAGE_DIR), &staged)
        .with_context(|| format!("Failed to stage {}", staged.display()))?;
    let packed = run_cmd(&dist, "tar", &["-czf", &format!("{name}.tar.gz"), &name]);
    fs::rename(&staged, dist.join(PACKAGE_DIR))?;
    packed?;

    let digest = sha256_file(&artifacts.tarball)?;
    fs::write(&artifacts.checksum, format!("{digest}  {name}.tar.gz\n"))?;

    println!("\nTarball:  {}", artifacts.tarball.display());
    println!("Checksum: {digest}");
    Ok(artifacts)
}

/// Removes `distribution/`.
pub fn clean(root: &Path) -> Result<()> {
    let dist = root.join(DIST_DIR);
    if dist.exists() {
        fs::remove_dir_all(&dist)
            .with_context(|| format!("Failed to remove {}", dist.display()))?;
    }
    println!("Removed {}", dist.display());
    Ok(())
}

/// `aurora-<version>-bin`
pub fn artifact_name(version: &str) -> String {
    format!("aurora-{version}-bin")
}

/// Reads the server crate version, following `version.workspace = true`.
pub fn read_version(root: &Path) -> Result<String> {
    let server = read_manifest(&root.join(SERVER_MANIFEST))?;
    let workspace = read_manifest(&root.join("Cargo.toml"))?;
    version_from_manifests(&server, &workspace)
}

fn read_manifest(path: &Path) -> Result<toml::Value> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn version_from_manifests(server: &toml::Value, workspace: &toml::Value) -> Result<String> {
    let version = server
        .get("package")
        .and_then(|package| package.get("version"))
        .context("aurora-server manifest has no package.version")?;

    if let Some(version) = version.as_str() {
        return Ok(version.to_string());
    }
    let inherited = version
        .get("workspace")
        .and_then(toml::Value::as_bool)
        .unwrap_or(false);
    if !inherited {
        anyhow::bail!("aurora-server package.version must be a string or workspace = true");
    }
    workspace
        .get("workspace")
        .and_then(|ws| ws.get("package"))
        .and_then(|package| package.get("version"))
        .and_then(toml::Value::as_str)
        .map(str::to_string)
        .context("workspace manifest has no workspace.package.version")
}

/// Hex-encoded SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
