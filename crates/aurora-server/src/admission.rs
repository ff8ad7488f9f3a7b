//! Request admission and header limits.
//!
//! At most `maxThreads` requests run at once. Up to
//! `threadPoolWorkQueueSize` more wait for a slot; anything beyond that is
//! turned away with `503 Service Unavailable` and `Retry-After: 1`.
//!
//! Requests whose request line and headers together exceed
//! `requestHeaderSize` bytes are answered with
//! `431 Request Header Fields Too Large`.
//!
//! On stop, requests still running after the drain limit are cut short with
//! `503` so the catalog can be closed under no load.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aurora_iceberg::IcebergError;
use aurora_iceberg::error::{IcebergErrorDetail, IcebergErrorResponse};
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Counter of requests turned away by admission control.
pub const ADMISSION_REJECTED_TOTAL: &str = "aurora_server_admission_rejected_total";

/// Counter of requests rejected for oversized headers.
pub const HEADER_TOO_LARGE_TOTAL: &str = "aurora_server_request_header_too_large_total";

/// Retry hint sent with 503 responses.
const RETRY_AFTER_SECONDS: u32 = 1;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Shared admission state.
#[derive(Debug)]
pub struct Admission {
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_running: usize,
    max_waiting: usize,
    abort: CancellationToken,
}

impl Admission {
    /// Allows `max_running` concurrent requests and `max_waiting` queued ones.
    #[must_use]
    pub fn new(max_running: usize, max_waiting: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_running)),
            waiting: AtomicUsize::new(0),
            max_running,
            max_waiting,
            abort: CancellationToken::new(),
        }
    }

    /// Requests currently waiting for a slot.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Requests currently running.
    #[must_use]
    pub fn running(&self) -> usize {
        self.max_running - self.permits.available_permits()
    }

    /// Stops admitting requests; queued ones are rejected.
    pub fn close(&self) {
        self.permits.close();
    }

    /// Cuts every running request short with `503`.
    pub fn abort_in_flight(&self) {
        self.abort.cancel();
    }

    /// Waits at most `limit` for every slot to be released. Returns whether
    /// the server went idle.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let idle = async {
            while self.running() > 0 {
                tokio::time::sleep(IDLE_POLL).await;
            }
        };
        tokio::time::timeout(limit, idle).await.is_ok()
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => return Some(permit),
            Err(TryAcquireError::Closed) => return None,
            Err(TryAcquireError::NoPermits) => {}
        }

        let _slot = QueueSlot::claim(&self.waiting, self.max_waiting)?;
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }
}

/// A place in the wait queue, released on drop so that cancelled requests
/// do not leak their slot.
struct QueueSlot<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> QueueSlot<'a> {
    fn claim(waiting: &'a AtomicUsize, max_waiting: usize) -> Option<Self> {
        waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max_waiting).then_some(current + 1)
            })
            .ok()
            .map(|_| Self { waiting })
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Admission middleware.
pub async fn admission_middleware(
    State(admission): State<Arc<Admission>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(permit) = admission.acquire().await else {
        tracing::warn!(
            path = %req.uri().path(),
            running = admission.running(),
            waiting = admission.waiting(),
            "Server is busy, rejecting request"
        );
        metrics::counter!(ADMISSION_REJECTED_TOTAL).increment(1);
        return IcebergError::ServiceUnavailable {
            message: "Server is busy, too many requests in flight".to_string(),
            retry_after_seconds: Some(RETRY_AFTER_SECONDS),
        }
        .into_response();
    };

    let path = req.uri().path().to_string();
    let response = tokio::select! {
        response = next.run(req) => response,
        () = admission.abort.cancelled() => {
            tracing::warn!(%path, "Aborted in-flight request on shutdown");
            IcebergError::ServiceUnavailable {
                message: "Server is stopping".to_string(),
                retry_after_seconds: Some(RETRY_AFTER_SECONDS),
            }
            .into_response()
        }
    };
    drop(permit);
    response
}

/// Approximate wire size of the request line and headers.
fn header_bytes(req: &Request<Body>) -> usize {
    let request_line = req.method().as_str().len() + req.uri().to_string().len() + 12;
    let headers: usize = req
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum();
    request_line + headers
}

/// Rejects requests whose headers exceed `limit` bytes.
pub async fn header_limit_middleware(
    State(limit): State<usize>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let size = header_bytes(&req);
    if size > limit {
        tracing::warn!(size, limit, path = %req.uri().path(), "Request headers too large");
        metrics::counter!(HEADER_TOO_LARGE_TOTAL).increment(1);
        let status = StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE;
        let body = IcebergErrorResponse {
            error: IcebergErrorDetail {
                message: format!("Request headers are {size} bytes, limit is {limit}"),
                error_type: "BadRequestException".to_string(),
                code: status.as_u16(),
            },
        };
        return (status, axum::Json(body)).into_response();
    }
    next.run(req).await
}
