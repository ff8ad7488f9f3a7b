//! Workspace automation tasks.
//!
//! Run with: `cargo xtask <command>`

mod dist;
mod licenses;
mod publish;
mod toolchain;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Aurora workspace automation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the server and lay out distribution/package
    CompileDistribution,
    /// Package the distribution as a tarball with a checksum
    AssembleDistribution,
    /// Remove the distribution directory
    CleanDistribution,
    /// Print the workspace dependency tree
    AllDeps,
    /// Fail if any source file carries disallowed license text
    CheckLicenses,
    /// Print the license of every third-party dependency
    LicenseReport,
    /// Upload the tarball and checksum to a Maven-style repository
    Publish {
        /// Base URL of the target repository
        #[arg(long)]
        repository: String,
    },
    /// Run all CI checks locally
    Ci,
    /// Validate workspace conventions
    Lint,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = workspace_root()?;

    match cli.command {
        Commands::CompileDistribution => dist::compile(&root),
        Commands::AssembleDistribution => dist::assemble(&root).map(|_| ()),
        Commands::CleanDistribution => dist::clean(&root),
        Commands::AllDeps => run_cmd(&root, "cargo", &["tree", "--workspace"]),
        Commands::CheckLicenses => licenses::check(&root),
        Commands::LicenseReport => licenses::report(&root),
        Commands::Publish { repository } => publish::publish(&root, &repository),
        Commands::Ci => run_ci(&root),
        Commands::Lint => run_lint(&root),
    }
}

fn workspace_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .context("xtask must live two levels below the workspace root")
}

fn run_ci(root: &Path) -> Result<()> {
    println!("Running CI checks...\n");

    run_cmd(root, "cargo", &["fmt", "--check"])?;
    run_cmd(
        root,
        "cargo",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )?;
    run_cmd(root, "cargo", &["test", "--workspace"])?;
    run_cmd(root, "cargo", &["doc", "--workspace", "--no-deps"])?;
    licenses::check(root)?;

    println!("\nAll CI checks passed!");
    Ok(())
}

fn run_lint(root: &Path) -> Result<()> {
    println!("Validating workspace conventions...\n");

    let crates = std::fs::read_dir(root.join("crates"))?;
    for entry in crates {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with("aurora-") {
            anyhow::bail!("Crate '{}' does not follow aurora-* naming", name);
        }
    }

    println!("All conventions validated!");
    Ok(())
}

fn run_cmd(root: &Path, cmd: &str, args: &[&str]) -> Result<()> {
    println!("$ {} {}", cmd, args.join(" "));
    let status = Command::new(cmd)
        .args(args)
        .current_dir(root)
        .status()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", cmd, args.join(" "));
    }
    Ok(())
}

/// Runs a command and returns its stdout.
fn capture_cmd(root: &Path, cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .current_dir(root)
        .output()
        .with_context(|| format!("Failed to run: {} {}", cmd, args.join(" ")))?;

    if !output.status.success() {
        anyhow::bail!(
            "Command failed: {} {}\n{}",
            cmd,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8(output.stdout).context("command output is not UTF-8")
}
