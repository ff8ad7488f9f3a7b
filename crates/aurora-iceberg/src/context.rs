//! Request ID propagation for Iceberg REST handlers.

use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request context, available to handlers as a request extension.
#[derive(Debug, Clone)]
pub struct IcebergRequestContext {
    /// Request ID for tracing/correlation.
    pub request_id: String,
}

impl IcebergRequestContext {
    fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(|| ulid::Ulid::new().to_string(), str::to_string);
        Self { request_id }
    }
}

fn add_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

/// Middleware that assigns a request ID and echoes it on the response.
pub async fn context_middleware(mut req: Request<Body>, next: Next) -> Response {
    let ctx = req
        .extensions()
        .get::<IcebergRequestContext>()
        .cloned()
        .unwrap_or_else(|| IcebergRequestContext::from_headers(req.headers()));
    req.extensions_mut().insert(ctx.clone());

    let span = tracing::debug_span!(
        "iceberg_request",
        request_id = %ctx.request_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span).await;
    add_request_id_header(&mut response, &ctx.request_id);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-Id", HeaderValue::from_static("req-123"));
        assert_eq!(IcebergRequestContext::from_headers(&headers).request_id, "req-123");
    }

    #[test]
    fn test_request_id_generated() {
        let ctx = IcebergRequestContext::from_headers(&HeaderMap::new());
        assert_eq!(ctx.request_id.len(), 26);
    }
}
