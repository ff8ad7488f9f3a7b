//! `aurora-iceberg-rest` binary entrypoint.
//!
//! Loads `aurora.conf`, builds a Tokio runtime sized from the HTTP thread
//! settings and serves until SIGINT or SIGTERM.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use aurora_server::config::ServerConfig;
use aurora_server::observability::{LogFormat, init_logging};

/// Iceberg REST catalog server.
#[derive(Debug, Parser)]
#[command(name = "aurora-iceberg-rest", version, about)]
struct Cli {
    /// Configuration file; defaults to `$AURORA_CONF_DIR/aurora.conf`,
    /// `$AURORA_HOME/conf/aurora.conf` or `conf/aurora.conf`.
    #[arg(long, short = 'c', env = "AURORA_CONF_FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogFormat::from_env());
    tracing::info!("Starting Iceberg REST Server");

    let config = ServerConfig::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.http.min_threads)
        .max_blocking_threads(config.http.max_threads)
        .thread_name("aurora-worker")
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    runtime.block_on(aurora_server::server::run(config))?;
    Ok(())
}
