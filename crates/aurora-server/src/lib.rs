//! # aurora-server
//!
//! Standalone Iceberg REST catalog server.
//!
//! This crate wires the [`aurora_iceberg`] handlers into a running
//! service:
//!
//! - **Configuration**: `aurora.conf` properties, typed and validated
//! - **Observability**: structured logging and Prometheus metrics
//! - **Lifecycle**: initialize, start, join and graceful stop
//! - **Admission**: bounded concurrency, header size and request timeouts
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /ready                  - Catalog backend readiness
//! GET  /metrics                - Prometheus metrics
//! GET  /prometheus/metrics     - Prometheus metrics
//!      /iceberg/v1/...         - Iceberg REST catalog
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use aurora_server::config::ServerConfig;
//! use aurora_server::server::IcebergRestServer;
//!
//! let mut server = IcebergRestServer::new(ServerConfig::load(None)?);
//! server.initialize()?;
//! server.start().await?;
//! server.join().await?;
//! server.stop().await;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod admission;
pub mod config;
pub mod observability;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigError, Properties, ServerConfig};
    pub use crate::observability::{LogFormat, init_logging};
    pub use crate::server::{IcebergRestServer, ServerError};
}
