//! Metrics report payloads posted by Iceberg clients.

use serde::{Deserialize, Serialize};

/// Kind of metrics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricsReportType {
    /// Emitted after a table scan is planned.
    ScanReport,
    /// Emitted after a commit.
    CommitReport,
}

impl MetricsReportType {
    /// Returns the wire name of the report type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScanReport => "scan-report",
            Self::CommitReport => "commit-report",
        }
    }
}

/// Request body for `POST .../tables/{table}/metrics`.
///
/// Only the discriminating fields are typed; the rest of the report is kept
/// verbatim so stores can persist what the client sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetricsRequest {
    /// Report kind.
    #[serde(rename = "report-type")]
    pub report_type: MetricsReportType,

    /// Fully qualified table name as seen by the client.
    #[serde(rename = "table-name")]
    pub table_name: String,

    /// Snapshot the report refers to.
    #[serde(rename = "snapshot-id")]
    pub snapshot_id: i64,

    /// Remaining report fields.
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}
