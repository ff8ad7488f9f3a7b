//! Table endpoint handlers for Iceberg REST Catalog.
//!
//! - `GET /v1/{prefix}/namespaces/{namespace}/tables` - List tables
//! - `POST /v1/{prefix}/namespaces/{namespace}/tables` - Create (or stage) a table
//! - `POST /v1/{prefix}/namespaces/{namespace}/register` - Register a metadata file
//! - `GET /v1/{prefix}/namespaces/{namespace}/tables/{table}` - Load table
//! - `HEAD /v1/{prefix}/namespaces/{namespace}/tables/{table}` - Check table exists
//! - `POST /v1/{prefix}/namespaces/{namespace}/tables/{table}` - Commit updates
//! - `DELETE /v1/{prefix}/namespaces/{namespace}/tables/{table}` - Drop table

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::instrument;

use crate::context::IcebergRequestContext;
use crate::error::{IcebergError, IcebergResult};
use crate::routes::utils::{paginate, parse_namespace, IcebergJson, IcebergQuery};
use crate::state::IcebergState;
use crate::types::{
    CommitTableRequest, CommitTableResponse, CreateTableRequest, DropTableQuery,
    ListTablesQuery, ListTablesResponse, LoadTableResponse, RegisterTableRequest, TableIdent,
};

/// Creates table routes.
pub fn routes() -> Router<IcebergState> {
    Router::new()
        .route(
            "/namespaces/:namespace/tables",
            get(list_tables).post(create_table),
        )
        .route("/namespaces/:namespace/register", post(register_table))
        .route(
            "/namespaces/:namespace/tables/:table",
            get(load_table)
                .head(head_table)
                .post(commit_table)
                .delete(drop_table),
        )
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamespacePath {
    pub(crate) prefix: String,
    pub(crate) namespace: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TablePath {
    pub(crate) prefix: String,
    pub(crate) namespace: String,
    pub(crate) table: String,
}

impl TablePath {
    /// Checks the prefix and resolves the path into a table identifier.
    pub(crate) fn resolve(&self, state: &IcebergState) -> IcebergResult<TableIdent> {
        state.config.check_prefix(&self.prefix)?;
        let namespace =
            parse_namespace(&self.namespace, &state.config.namespace_separator_decoded())?;
        if self.table.is_empty() {
            return Err(IcebergError::bad_request("Table name must not be empty"));
        }
        Ok(TableIdent::new(namespace, self.table.clone()))
    }
}

/// List tables in a namespace.
#[utoipa::path(
    get,
    path = "/v1/{prefix}/namespaces/{namespace}/tables",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)"),
        ListTablesQuery
    ),
    responses(
        (status = 200, description = "Tables listed", body = ListTablesResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace))]
async fn list_tables(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
    IcebergQuery(query): IcebergQuery<ListTablesQuery>,
) -> IcebergResult<Json<ListTablesResponse>> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;

    let identifiers = state.ops.list_tables(&namespace).await?;
    let (identifiers, next_page_token) =
        paginate(identifiers, query.page_token.as_deref(), query.page_size)?;

    Ok(Json(ListTablesResponse {
        identifiers,
        next_page_token,
    }))
}

/// Create a table, or stage it when `stage-create` is set.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/namespaces/{namespace}/tables",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)")
    ),
    request_body = CreateTableRequest,
    responses(
        (status = 200, description = "Table created", body = LoadTableResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Table already exists", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %request.name))]
async fn create_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
    IcebergJson(request): IcebergJson<CreateTableRequest>,
) -> IcebergResult<Json<LoadTableResponse>> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;
    let response = state.ops.create_table(&namespace, request).await?;
    Ok(Json(response))
}

/// Register an existing metadata file as a table.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/namespaces/{namespace}/register",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)")
    ),
    request_body = RegisterTableRequest,
    responses(
        (status = 200, description = "Table registered", body = LoadTableResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Namespace or metadata file not found", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Table already exists", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %request.name))]
async fn register_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
    IcebergJson(request): IcebergJson<RegisterTableRequest>,
) -> IcebergResult<Json<LoadTableResponse>> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;
    let response = state.ops.register_table(&namespace, request).await?;
    Ok(Json(response))
}

/// Load a table's current metadata.
#[utoipa::path(
    get,
    path = "/v1/{prefix}/namespaces/{namespace}/tables/{table}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)"),
        ("table" = String, Path, description = "Table name")
    ),
    responses(
        (status = 200, description = "Table loaded", body = LoadTableResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Table not found", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %path.table))]
async fn load_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<TablePath>,
) -> IcebergResult<Json<LoadTableResponse>> {
    let ident = path.resolve(&state)?;
    Ok(Json(state.ops.load_table(&ident).await?))
}

/// Check whether a table exists.
#[utoipa::path(
    head,
    path = "/v1/{prefix}/namespaces/{namespace}/tables/{table}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)"),
        ("table" = String, Path, description = "Table name")
    ),
    responses(
        (status = 204, description = "Table exists"),
        (status = 404, description = "Table not found"),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %path.table))]
async fn head_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<TablePath>,
) -> IcebergResult<StatusCode> {
    let ident = path.resolve(&state)?;
    if state.ops.table_exists(&ident).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(IcebergError::table_not_found(&ident.to_string()))
    }
}

/// Commit updates to a table.
///
/// A body with an `assert-create` requirement completes a staged create.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/namespaces/{namespace}/tables/{table}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)"),
        ("table" = String, Path, description = "Table name")
    ),
    request_body = CommitTableRequest,
    responses(
        (status = 200, description = "Commit applied", body = CommitTableResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Table not found", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Commit conflict", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %path.table))]
async fn commit_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<TablePath>,
    IcebergJson(request): IcebergJson<CommitTableRequest>,
) -> IcebergResult<Json<CommitTableResponse>> {
    let ident = path.resolve(&state)?;
    if let Some(body_ident) = &request.identifier {
        if body_ident != &ident {
            return Err(IcebergError::bad_request(format!(
                "Table identifier {body_ident} does not match path {ident}"
            )));
        }
    }
    Ok(Json(state.ops.commit_table(&ident, &request).await?))
}

/// Drop a table, optionally purging its metadata files.
#[utoipa::path(
    delete,
    path = "/v1/{prefix}/namespaces/{namespace}/tables/{table}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)"),
        ("table" = String, Path, description = "Table name"),
        DropTableQuery
    ),
    responses(
        (status = 204, description = "Table dropped"),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Table not found", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Tables"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace, table = %path.table, purge = query.purge_requested))]
async fn drop_table(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<TablePath>,
    IcebergQuery(query): IcebergQuery<DropTableQuery>,
) -> IcebergResult<StatusCode> {
    let ident = path.resolve(&state)?;
    state.ops.drop_table(&ident, query.purge_requested).await?;
    Ok(StatusCode::NO_CONTENT)
}
