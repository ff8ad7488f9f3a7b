//! # aurora-iceberg
//!
//! Iceberg REST Catalog handlers, backends and table operations for Aurora.
//!
//! This crate implements the [Apache Iceberg REST Catalog API](https://iceberg.apache.org/spec/#rest-catalog)
//! on top of two pluggable seams:
//!
//! - **Catalog backends** ([`backend::CatalogBackend`]): namespaces and the
//!   current metadata location of every table. `memory` is process-local;
//!   `jdbc` keeps the Iceberg JDBC catalog schema in SQLite.
//! - **File IO** ([`io::FileIo`]): reads and writes metadata JSON for
//!   `memory://` and local file locations.
//!
//! A commit reads the current metadata, checks the client's requirements,
//! applies its updates, writes a new metadata file and swaps the table's
//! pointer with a compare-and-swap. Client scan and commit reports are queued
//! to a [`metrics_manager::IcebergMetricsManager`] without blocking the
//! request.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aurora_iceberg::router::iceberg_router;
//!
//! let app = axum::Router::new().nest("/iceberg", iceberg_router(state));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod context;
pub mod error;
pub mod io;
pub mod metadata;
pub mod metrics;
pub mod metrics_manager;
pub mod openapi;
pub mod ops;
pub mod router;
pub mod state;
pub mod types;

// Route handlers (exposed for OpenAPI generation)
pub mod routes;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::backend::{CatalogBackend, CatalogBackendKind, MemoryBackend, SqliteBackend};
    pub use crate::error::{IcebergError, IcebergResult};
    pub use crate::io::{FileIo, ResolvingFileIo};
    pub use crate::metrics_manager::{IcebergMetricsManager, MetricsManagerConfig};
    pub use crate::ops::IcebergTableOps;
    pub use crate::router::iceberg_router;
    pub use crate::state::{IcebergConfig, IcebergState};
    pub use crate::types::*;
}

// Re-export key types at crate root
pub use error::{IcebergError, IcebergResult};
pub use openapi::{IcebergApiDoc, openapi, openapi_json};
pub use ops::IcebergTableOps;
pub use router::iceberg_router;
pub use state::{IcebergConfig, IcebergState};
