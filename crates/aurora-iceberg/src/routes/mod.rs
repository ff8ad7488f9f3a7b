//! Route handlers for Iceberg REST Catalog endpoints.

pub mod catalog;
pub mod config;
pub mod metrics_report;
pub mod namespaces;
pub mod openapi;
pub mod tables;
pub(crate) mod utils;

pub use utils::IcebergJson;
