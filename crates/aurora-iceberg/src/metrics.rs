//! Prometheus metrics for the catalog.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `aurora_iceberg_request_duration_seconds` | histogram | endpoint, method, status, status_class |
//! | `aurora_iceberg_request_total` | counter | same |
//! | `aurora_iceberg_request_error_total` | counter | same, 4xx and 5xx only |
//! | `aurora_iceberg_commit_conflict_total` | counter | operation, reason |
//! | `aurora_iceberg_metrics_reports_total` | counter | report_type |
//! | `aurora_iceberg_metrics_reports_dropped_total` | counter | report_type |

use std::sync::{Mutex, Once, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Request latency histogram.
pub const ICEBERG_REQUEST_DURATION: &str = "aurora_iceberg_request_duration_seconds";
/// Requests served.
pub const ICEBERG_REQUEST_TOTAL: &str = "aurora_iceberg_request_total";
/// Requests answered with 4xx or 5xx.
pub const ICEBERG_REQUEST_ERROR_TOTAL: &str = "aurora_iceberg_request_error_total";
/// Commits rejected by a requirement or a lost pointer swap.
pub const ICEBERG_COMMIT_CONFLICT_TOTAL: &str = "aurora_iceberg_commit_conflict_total";
/// Client reports queued for the metrics store.
pub const ICEBERG_METRICS_REPORTS_TOTAL: &str = "aurora_iceberg_metrics_reports_total";
/// Client reports discarded because the queue was full or closed.
pub const ICEBERG_METRICS_REPORTS_DROPPED_TOTAL: &str =
    "aurora_iceberg_metrics_reports_dropped_total";

/// Requests slower than this are logged at `warn`.
const SLOW_REQUEST: Duration = Duration::from_secs(1);

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();
static RECORDER_INSTALL: Mutex<()> = Mutex::new(());
static DESCRIBED: Once = Once::new();

fn describe() {
    DESCRIBED.call_once(|| {
        describe_histogram!(ICEBERG_REQUEST_DURATION, "Catalog request latency in seconds");
        describe_counter!(ICEBERG_REQUEST_TOTAL, "Catalog requests served");
        describe_counter!(ICEBERG_REQUEST_ERROR_TOTAL, "Catalog requests that failed");
        describe_counter!(ICEBERG_COMMIT_CONFLICT_TOTAL, "Rejected table commits");
        describe_counter!(ICEBERG_METRICS_REPORTS_TOTAL, "Client metrics reports queued");
        describe_counter!(
            ICEBERG_METRICS_REPORTS_DROPPED_TOTAL,
            "Client metrics reports dropped"
        );
    });
}

/// Installs the process-wide Prometheus recorder, or returns the one
/// already installed.
///
/// # Errors
///
/// Fails when a different recorder was installed by someone else.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let _guard = RECORDER_INSTALL.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = RECORDER.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe();
    tracing::info!("installed Prometheus recorder");
    Ok(RECORDER.get_or_init(|| handle).clone())
}

/// The installed recorder, if [`init_metrics`] has run.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    RECORDER.get().cloned()
}

/// Labels attached to per-request series.
struct RequestLabels {
    endpoint: String,
    method: String,
    status: StatusCode,
}

impl RequestLabels {
    fn as_pairs(&self) -> [(&'static str, String); 4] {
        [
            ("endpoint", self.endpoint.clone()),
            ("method", self.method.clone()),
            ("status", self.status.as_u16().to_string()),
            ("status_class", status_class(self.status).to_string()),
        ]
    }

    fn record(&self, elapsed: Duration) {
        let labels = self.as_pairs();
        histogram!(ICEBERG_REQUEST_DURATION, &labels).record(elapsed.as_secs_f64());
        counter!(ICEBERG_REQUEST_TOTAL, &labels).increment(1);
        if is_error(self.status) {
            counter!(ICEBERG_REQUEST_ERROR_TOTAL, &labels).increment(1);
        }
        if elapsed > SLOW_REQUEST {
            tracing::warn!(
                endpoint = %self.endpoint,
                method = %self.method,
                status = self.status.as_u16(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "slow catalog request"
            );
        }
    }
}

/// Times every request and records it under its route template.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let started = Instant::now();
    // Route templates keep label cardinality bounded.
    let endpoint = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => request.uri().path().to_string(),
    };
    let method = request.method().to_string();

    let response = next.run(request).await;

    RequestLabels {
        endpoint,
        method,
        status: response.status(),
    }
    .record(started.elapsed());
    response
}

/// Counts a rejected commit. `reason` is `requirement` or `pointer_cas`.
pub fn record_commit_conflict(operation: &str, reason: &str) {
    describe();
    counter!(
        ICEBERG_COMMIT_CONFLICT_TOTAL,
        "operation" => operation.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Counts a queued client report.
pub fn record_metrics_report(report_type: &str) {
    describe();
    counter!(ICEBERG_METRICS_REPORTS_TOTAL, "report_type" => report_type.to_string()).increment(1);
}

/// Counts a dropped client report.
pub fn record_metrics_report_dropped(report_type: &str) {
    describe();
    counter!(ICEBERG_METRICS_REPORTS_DROPPED_TOTAL, "report_type" => report_type.to_string())
        .increment(1);
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() / 100 {
        1 => "1xx",
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "unknown",
    }
}

fn is_error(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// `GET /metrics` and `GET /prometheus/metrics`.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (StatusCode::OK, [(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics recorder is not installed".to_string(),
        ),
    }
}
