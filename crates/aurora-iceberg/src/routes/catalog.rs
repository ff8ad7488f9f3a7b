//! Catalog-level endpoint handlers for Iceberg REST Catalog.
//!
//! These endpoints operate at the prefix level rather than on a specific
//! namespace or table:
//!
//! - `POST /v1/{prefix}/tables/rename` - Rename a table
//! - `POST /v1/{prefix}/transactions/commit` - Atomic multi-table commit

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tracing::instrument;

use crate::context::IcebergRequestContext;
use crate::error::{IcebergError, IcebergResult};
use crate::routes::namespaces::PrefixPath;
use crate::routes::utils::IcebergJson;
use crate::state::IcebergState;
use crate::types::{CommitTransactionRequest, RenameTableRequest};

/// Creates catalog-level routes (rename, transactions).
pub fn routes() -> Router<IcebergState> {
    Router::new()
        .route("/tables/rename", post(rename_table))
        .route("/transactions/commit", post(commit_transaction))
}

/// Rename a table, possibly into another namespace.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/tables/rename",
    params(("prefix" = String, Path, description = "Catalog prefix")),
    request_body = RenameTableRequest,
    responses(
        (status = 204, description = "Table renamed"),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Source table or destination namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Destination already exists", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Catalog"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, source = %request.source, destination = %request.destination))]
async fn rename_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<PrefixPath>,
    IcebergJson(request): IcebergJson<RenameTableRequest>,
) -> IcebergResult<StatusCode> {
    state.config.check_prefix(&path.prefix)?;
    state
        .ops
        .rename_table(&request.source, &request.destination)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Commit changes to several tables atomically.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/transactions/commit",
    params(("prefix" = String, Path, description = "Catalog prefix")),
    request_body = CommitTransactionRequest,
    responses(
        (status = 204, description = "Transaction committed"),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Table not found", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Commit conflict", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Catalog"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, tables = request.table_changes.len()))]
async fn commit_transaction(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<PrefixPath>,
    IcebergJson(request): IcebergJson<CommitTransactionRequest>,
) -> IcebergResult<StatusCode> {
    state.config.check_prefix(&path.prefix)?;
    if request.table_changes.is_empty() {
        return Err(IcebergError::bad_request(
            "Invalid table changes: must not be empty",
        ));
    }
    state.ops.commit_transaction(&request).await?;
    Ok(StatusCode::NO_CONTENT)
}
