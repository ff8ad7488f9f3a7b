//! Shared state and configuration for Iceberg REST handlers.

use std::sync::Arc;

use crate::error::{IcebergError, IcebergResult};
use crate::metrics_manager::IcebergMetricsManager;
use crate::ops::IcebergTableOps;

/// Server-side configuration for the Iceberg REST API.
#[derive(Debug, Clone)]
pub struct IcebergConfig {
    /// Catalog prefix. When set it is advertised in `/v1/config` and every
    /// request must use it; when unset any prefix segment is accepted.
    pub prefix: Option<String>,
    /// Namespace separator used in paths (URL-encoded).
    pub namespace_separator: String,
}

impl Default for IcebergConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            namespace_separator: "%1F".to_string(),
        }
    }
}

impl IcebergConfig {
    /// Returns the decoded namespace separator.
    #[must_use]
    pub fn namespace_separator_decoded(&self) -> String {
        decode_percent(&self.namespace_separator)
    }

    /// Rejects a path prefix that does not match the configured one.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` on a mismatch.
    pub fn check_prefix(&self, prefix: &str) -> IcebergResult<()> {
        match &self.prefix {
            Some(expected) if expected != prefix => Err(IcebergError::bad_request(format!(
                "Unknown catalog prefix '{prefix}', expected '{expected}'"
            ))),
            _ => Ok(()),
        }
    }
}

/// Shared state for Iceberg REST handlers.
#[derive(Clone)]
pub struct IcebergState {
    /// Namespace and table operations.
    pub ops: Arc<IcebergTableOps>,
    /// Sink for client-posted metrics reports.
    pub metrics_manager: Arc<IcebergMetricsManager>,
    /// Server-side configuration.
    pub config: IcebergConfig,
}

impl std::fmt::Debug for IcebergState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcebergState")
            .field("ops", &self.ops)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl IcebergState {
    /// Creates state with default configuration.
    #[must_use]
    pub fn new(ops: Arc<IcebergTableOps>, metrics_manager: Arc<IcebergMetricsManager>) -> Self {
        Self::with_config(ops, metrics_manager, IcebergConfig::default())
    }

    /// Creates state with explicit configuration.
    #[must_use]
    pub fn with_config(
        ops: Arc<IcebergTableOps>,
        metrics_manager: Arc<IcebergMetricsManager>,
        config: IcebergConfig,
    ) -> Self {
        Self {
            ops,
            metrics_manager,
            config,
        }
    }
}

/// In-memory state for handler tests.
#[cfg(test)]
pub(crate) fn test_state(config: IcebergConfig) -> IcebergState {
    use crate::backend::MemoryBackend;
    use crate::io::MemoryFileIo;
    use crate::metrics_manager::{MetricsManagerConfig, MetricsStoreKind};

    let ops = IcebergTableOps::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryFileIo::new()),
        "memory://warehouse",
    );
    let manager_config = MetricsManagerConfig {
        store: MetricsStoreKind::Memory,
        ..MetricsManagerConfig::default()
    };
    let manager = IcebergMetricsManager::new(&manager_config).expect("metrics manager");
    IcebergState::with_config(Arc::new(ops), Arc::new(manager), config)
}

fn decode_percent(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch == '%' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let (Some(hi), Some(lo)) = (hi.to_digit(16), lo.to_digit(16)) {
                    #[allow(clippy::cast_possible_truncation)]
                    let byte = ((hi << 4) | lo) as u8;
                    out.push(byte as char);
                    continue;
                }
                out.push('%');
                out.push(hi);
                out.push(lo);
                continue;
            }
            out.push('%');
            out.extend(hi);
            continue;
        }
        out.push(ch);
    }

    out
}
