//! Iceberg REST Catalog router setup.

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::context::context_middleware;
use crate::metrics::metrics_middleware;
use crate::routes;
use crate::state::IcebergState;

/// Creates the Iceberg REST Catalog router.
///
/// The server nests it under `/iceberg`, so clients configure
/// `http://host:port/iceberg` as the catalog URI:
///
/// ```rust,ignore
/// use aurora_iceberg::router::iceberg_router;
///
/// let app = axum::Router::new().nest("/iceberg", iceberg_router(state));
/// ```
///
/// Request IDs, request metrics and tracing spans are applied to every
/// route. Admission control and timeouts belong to the outer server.
pub fn iceberg_router(state: IcebergState) -> Router {
    Router::new()
        .route("/openapi.json", get(routes::openapi::get_openapi_json))
        .route("/v1/config", get(routes::config::get_config))
        .nest("/v1/:prefix", prefixed_routes())
        .layer(middleware::from_fn(context_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn prefixed_routes() -> Router<IcebergState> {
    Router::new()
        .route("/config", get(routes::config::get_prefixed_config))
        .merge(routes::namespaces::routes())
        .merge(routes::tables::routes())
        .merge(routes::metrics_report::routes())
        .merge(routes::catalog::routes())
}
