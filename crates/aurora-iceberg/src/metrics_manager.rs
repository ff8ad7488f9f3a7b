//! Asynchronous sink for client-posted scan and commit reports.
//!
//! Handlers enqueue reports without waiting; a single writer task moves them
//! into a [`MetricsStore`]. When the queue is full the report is dropped and
//! counted, so a slow store never stalls request handling.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::metrics;
use crate::types::{ReportMetricsRequest, TableIdent};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Errors from the metrics manager and its stores.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The configured store name is not known.
    #[error("unknown metrics store '{0}' (expected memory)")]
    UnknownStore(String),

    /// Queue capacity must be positive.
    #[error("metrics queue capacity must be greater than 0")]
    InvalidCapacity,

    /// The store failed to persist or clean reports.
    #[error("metrics store error: {0}")]
    Store(String),
}

/// Which store backs the metrics manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricsStoreKind {
    /// Reports are discarded.
    #[default]
    None,
    /// Reports are kept in process memory.
    Memory,
}

impl FromStr for MetricsStoreKind {
    type Err = MetricsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            other => Err(MetricsError::UnknownStore(other.to_string())),
        }
    }
}

/// Metrics manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsManagerConfig {
    /// Store to write reports to.
    pub store: MetricsStoreKind,
    /// Days to keep reports; `<= 0` keeps them forever.
    pub retain_days: i32,
    /// Bounded queue size.
    pub queue_capacity: usize,
}

impl Default for MetricsManagerConfig {
    fn default() -> Self {
        Self {
            store: MetricsStoreKind::None,
            retain_days: -1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// A report as received, tagged with the table from the request path.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    /// When the server accepted the report.
    pub received_at: DateTime<Utc>,
    /// Table the report was posted for.
    pub table: TableIdent,
    /// Report body.
    pub report: ReportMetricsRequest,
}

/// Destination for metrics reports.
#[async_trait]
pub trait MetricsStore: Send + Sync + 'static {
    /// Persists one report.
    async fn record(&self, report: StoredReport) -> Result<(), MetricsError>;

    /// Deletes reports received before `cutoff`; returns how many were removed.
    async fn clean(&self, cutoff: DateTime<Utc>) -> Result<usize, MetricsError>;

    /// Releases store resources.
    async fn close(&self) -> Result<(), MetricsError> {
        Ok(())
    }
}

/// Store that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyMetricsStore;

#[async_trait]
impl MetricsStore for DummyMetricsStore {
    async fn record(&self, _report: StoredReport) -> Result<(), MetricsError> {
        Ok(())
    }

    async fn clean(&self, _cutoff: DateTime<Utc>) -> Result<usize, MetricsError> {
        Ok(0)
    }
}

/// Store that keeps reports in memory, queryable by table.
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
    reports: Mutex<Vec<StoredReport>>,
}

impl MemoryMetricsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns reports posted for `table`, oldest first.
    #[must_use]
    pub fn reports_for(&self, table: &TableIdent) -> Vec<StoredReport> {
        self.reports
            .lock()
            .map(|reports| {
                reports
                    .iter()
                    .filter(|r| &r.table == table)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of stored reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn record(&self, report: StoredReport) -> Result<(), MetricsError> {
        self.reports
            .lock()
            .map_err(|_| MetricsError::Store("memory metrics store lock poisoned".into()))?
            .push(report);
        Ok(())
    }

    async fn clean(&self, cutoff: DateTime<Utc>) -> Result<usize, MetricsError> {
        let mut reports = self
            .reports
            .lock()
            .map_err(|_| MetricsError::Store("memory metrics store lock poisoned".into()))?;
        let before = reports.len();
        reports.retain(|r| r.received_at >= cutoff);
        Ok(before - reports.len())
    }
}

/// Queues client metrics reports and writes them to a store in the
/// background.
pub struct IcebergMetricsManager {
    sender: Mutex<Option<mpsc::Sender<StoredReport>>>,
    receiver: Mutex<Option<mpsc::Receiver<StoredReport>>>,
    store: Arc<dyn MetricsStore>,
    retain_days: i32,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for IcebergMetricsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcebergMetricsManager")
            .field("retain_days", &self.retain_days)
            .finish_non_exhaustive()
    }
}

impl IcebergMetricsManager {
    /// Creates a manager with the store named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCapacity` when the queue capacity is zero.
    pub fn new(config: &MetricsManagerConfig) -> Result<Self, MetricsError> {
        let store: Arc<dyn MetricsStore> = match config.store {
            MetricsStoreKind::None => Arc::new(DummyMetricsStore),
            MetricsStoreKind::Memory => Arc::new(MemoryMetricsStore::new()),
        };
        Self::with_store(config, store)
    }

    /// Creates a manager writing to `store`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCapacity` when the queue capacity is zero.
    pub fn with_store(
        config: &MetricsManagerConfig,
        store: Arc<dyn MetricsStore>,
    ) -> Result<Self, MetricsError> {
        if config.queue_capacity == 0 {
            return Err(MetricsError::InvalidCapacity);
        }
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            store,
            retain_days: config.retain_days,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the writer task and, when retention is bounded, the hourly
    /// cleanup task. Calling it twice has no effect.
    pub fn start(&self) {
        let Some(mut receiver) = self.receiver.lock().ok().and_then(|mut r| r.take()) else {
            return;
        };

        let store = Arc::clone(&self.store);
        let writer = tokio::spawn(async move {
            while let Some(report) = receiver.recv().await {
                if let Err(err) = store.record(report).await {
                    tracing::warn!(error = %err, "Failed to store Iceberg metrics report");
                }
            }
            tracing::debug!("Iceberg metrics writer drained");
        });

        let mut handles = vec![writer];
        if self.retain_days > 0 {
            let store = Arc::clone(&self.store);
            let cancel = self.cancel.clone();
            let retain = chrono::Duration::days(i64::from(self.retain_days));
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            let cutoff = Utc::now() - retain;
                            match store.clean(cutoff).await {
                                Ok(removed) if removed > 0 => {
                                    tracing::info!(removed, %cutoff, "Cleaned expired Iceberg metrics reports");
                                }
                                Ok(_) => {}
                                Err(err) => {
                                    tracing::warn!(error = %err, "Failed to clean Iceberg metrics reports");
                                }
                            }
                        }
                    }
                }
            }));
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.extend(handles);
        }
        tracing::info!(retain_days = self.retain_days, "Iceberg metrics manager started");
    }

    /// Enqueues a report without waiting.
    ///
    /// Returns false when the report was dropped because the queue is full
    /// or the manager is closed.
    pub fn record(&self, table: TableIdent, report: ReportMetricsRequest) -> bool {
        let report_type = report.report_type.as_str();
        let sender = self.sender.lock().ok().and_then(|s| s.clone());
        let Some(sender) = sender else {
            metrics::record_metrics_report_dropped(report_type);
            tracing::warn!(table = %table, report_type, "Iceberg metrics manager is closed, dropping report");
            return false;
        };

        let stored = StoredReport {
            received_at: Utc::now(),
            table,
            report,
        };
        match sender.try_send(stored) {
            Ok(()) => {
                metrics::record_metrics_report(report_type);
                true
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                metrics::record_metrics_report_dropped(report_type);
                tracing::warn!(
                    table = %dropped.table,
                    report_type,
                    "Iceberg metrics queue is full, dropping report"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                metrics::record_metrics_report_dropped(report_type);
                tracing::warn!(table = %dropped.table, report_type, "Iceberg metrics queue is closed, dropping report");
                false
            }
        }
    }

    /// Stops accepting reports, drains the queue into the store and waits
    /// for background tasks.
    pub async fn close(&self) {
        self.cancel.cancel();
        // Dropping the last sender lets the writer finish once the queue is empty.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        // Never started: drain inline.
        let pending = self.receiver.lock().ok().and_then(|mut r| r.take());
        if let Some(mut receiver) = pending {
            receiver.close();
            while let Ok(report) = receiver.try_recv() {
                if let Err(err) = self.store.record(report).await {
                    tracing::warn!(error = %err, "Failed to store Iceberg metrics report");
                }
            }
        }

        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "Iceberg metrics task failed");
            }
        }

        if let Err(err) = self.store.close().await {
            tracing::warn!(error = %err, "Failed to close Iceberg metrics store");
        }
        tracing::info!("Iceberg metrics manager closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricsReportType;

    fn report(snapshot_id: i64) -> ReportMetricsRequest {
        ReportMetricsRequest {
            report_type: MetricsReportType::ScanReport,
            table_name: "db.events".to_string(),
            snapshot_id,
            details: serde_json::Map::new(),
        }
    }

    fn manager(capacity: usize) -> (IcebergMetricsManager, Arc<MemoryMetricsStore>) {
        let store = Arc::new(MemoryMetricsStore::new());
        let config = MetricsManagerConfig {
            store: MetricsStoreKind::Memory,
            retain_days: -1,
            queue_capacity: capacity,
        };
        let manager =
            IcebergMetricsManager::with_store(&config, Arc::clone(&store) as Arc<dyn MetricsStore>)
                .expect("manager");
        (manager, store)
    }

    #[test]
    fn test_store_kind_parsing() {
        assert_eq!("Memory".parse::<MetricsStoreKind>().ok(), Some(MetricsStoreKind::Memory));
        assert_eq!("".parse::<MetricsStoreKind>().ok(), Some(MetricsStoreKind::None));
        assert!(matches!(
            "jdbc".parse::<MetricsStoreKind>(),
            Err(MetricsError::UnknownStore(name)) if name == "jdbc"
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = MetricsManagerConfig {
            queue_capacity: 0,
            ..MetricsManagerConfig::default()
        };
        assert!(matches!(
            IcebergMetricsManager::new(&config),
            Err(MetricsError::InvalidCapacity)
        ));
    }

    #[tokio::test]
    async fn test_full_queue_drops_reports() {
        let (manager, store) = manager(2);
        let table = TableIdent::simple("db", "events");
        assert!(manager.record(table.clone(), report(1)));
        assert!(manager.record(table.clone(), report(2)));
        assert!(!manager.record(table.clone(), report(3)));

        manager.close().await;
        let stored = store.reports_for(&table);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].report.snapshot_id, 1);
    }

    #[tokio::test]
    async fn test_started_manager_drains_on_close() {
        let (manager, store) = manager(16);
        manager.start();
        let table = TableIdent::simple("db", "events");
        for id in 0..10 {
            assert!(manager.record(table.clone(), report(id)));
        }
        manager.close().await;
        assert_eq!(store.len(), 10);
        assert!(!manager.record(table, report(99)));
    }

    #[tokio::test]
    async fn test_memory_store_clean() {
        let store = MemoryMetricsStore::new();
        let table = TableIdent::simple("db", "events");
        let now = Utc::now();
        for (days, id) in [(10, 1), (1, 2)] {
            store
                .record(StoredReport {
                    received_at: now - chrono::Duration::days(days),
                    table: table.clone(),
                    report: report(id),
                })
                .await
                .expect("record");
        }
        let removed = store
            .clean(now - chrono::Duration::days(7))
            .await
            .expect("clean");
        assert_eq!(removed, 1);
        assert_eq!(store.reports_for(&table)[0].report.snapshot_id, 2);
    }
}
