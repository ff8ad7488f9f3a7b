//! Handler for client metrics reports.
//!
//! `POST /v1/{prefix}/namespaces/{namespace}/tables/{table}/metrics` accepts
//! scan and commit reports and hands them to the metrics manager. The
//! response never waits on the store.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tracing::instrument;

use crate::context::IcebergRequestContext;
use crate::error::IcebergResult;
use crate::routes::tables::TablePath;
use crate::routes::utils::IcebergJson;
use crate::state::IcebergState;
use crate::types::ReportMetricsRequest;

/// Creates the metrics report route.
pub fn routes() -> Router<IcebergState> {
    Router::new().route(
        "/namespaces/:namespace/tables/:table/metrics",
        post(report_metrics),
    )
}

/// Send a scan or commit report for a table.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/namespaces/{namespace}/tables/{table}/metrics",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)"),
        ("table" = String, Path, description = "Table name")
    ),
    request_body(content = Object, description = "Scan or commit report"),
    responses(
        (status = 204, description = "Report accepted"),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %path.table, report_type = report.report_type.as_str()))]
async fn report_metrics(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<TablePath>,
    IcebergJson(report): IcebergJson<ReportMetricsRequest>,
) -> IcebergResult<StatusCode> {
    let ident = path.resolve(&state)?;
    // A dropped report is logged and counted by the manager; clients still
    // get 204.
    state.metrics_manager.record(ident, report);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{IcebergConfig, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(state: IcebergState) -> Router {
        Router::new()
            .nest("/v1/:prefix", routes())
            .layer(axum::middleware::from_fn(
                crate::context::context_middleware,
            ))
            .with_state(state)
    }

    async fn post_report(app: Router, body: &str) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/p/namespaces/sales/tables/orders/metrics")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
        .expect("request failed")
        .status()
    }

    #[tokio::test]
    async fn test_report_accepted() {
        let state = test_state(IcebergConfig::default());
        let body = r#"{"report-type":"scan-report","table-name":"sales.orders","snapshot-id":1,
            "filter":true,"schema-id":0,"projected-field-ids":[1],"projected-field-names":["id"],"metrics":{}}"#;
        assert_eq!(post_report(app(state), body).await, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_report_type_rejected() {
        let state = test_state(IcebergConfig::default());
        let body = r#"{"report-type":"bogus","table-name":"t","snapshot-id":1}"#;
        assert_eq!(post_report(app(state), body).await, StatusCode::BAD_REQUEST);
    }
}
