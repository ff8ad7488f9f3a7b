//! Namespace endpoint handlers for Iceberg REST Catalog.
//!
//! - `GET /v1/{prefix}/namespaces` - List namespaces
//! - `POST /v1/{prefix}/namespaces` - Create namespace
//! - `GET /v1/{prefix}/namespaces/{namespace}` - Load namespace
//! - `HEAD /v1/{prefix}/namespaces/{namespace}` - Check namespace exists
//! - `DELETE /v1/{prefix}/namespaces/{namespace}` - Drop namespace
//! - `POST /v1/{prefix}/namespaces/{namespace}/properties` - Update properties

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
    CreateNamespaceRequest, CreateNamespaceResponse, GetNamespaceResponse, ListNamespacesQuery,
    ListNamespacesResponse, UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
    namespace_display,
};

/// Creates namespace routes.
pub fn routes() -> Router<IcebergState> {
    Router::new()
        .route("/namespaces", get(list_namespaces).post(create_namespace))
        .route(
            "/namespaces/:namespace",
            get(get_namespace)
                .head(head_namespace)
                .delete(drop_namespace),
        )
        .route(
            "/namespaces/:namespace/properties",
            post(update_namespace_properties),
        )
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrefixPath {
    pub(crate) prefix: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamespacePath {
    pub(crate) prefix: String,
    pub(crate) namespace: String,
}

/// List namespaces.
#[utoipa::path(
    get,
    path = "/v1/{prefix}/namespaces",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ListNamespacesQuery
    ),
    responses(
        (status = 200, description = "Namespaces listed", body = ListNamespacesResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Parent namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Namespaces"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix))]
async fn list_namespaces(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<PrefixPath>,
    IcebergQuery(query): IcebergQuery<ListNamespacesQuery>,
) -> IcebergResult<Json<ListNamespacesResponse>> {
    state.config.check_prefix(&path.prefix)?;
    let separator = state.config.namespace_separator_decoded();

    let parent = query
        .parent
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| parse_namespace(p, &separator))
        .transpose()?;

    let namespaces = state.ops.list_namespaces(parent.as_ref()).await?;
    let (namespaces, next_page_token) =
        paginate(namespaces, query.page_token.as_deref(), query.page_size)?;

    Ok(Json(ListNamespacesResponse {
        namespaces,
        next_page_token,
    }))
}

/// Create a namespace.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/namespaces",
    params(("prefix" = String, Path, description = "Catalog prefix")),
    request_body = CreateNamespaceRequest,
    responses(
        (status = 200, description = "Namespace created", body = CreateNamespaceResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Namespace already exists", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Namespaces"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix))]
async fn create_namespace(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<PrefixPath>,
    IcebergJson(request): IcebergJson<CreateNamespaceRequest>,
) -> IcebergResult<Json<CreateNamespaceResponse>> {
    state.config.check_prefix(&path.prefix)?;
    if request.namespace.is_empty() {
        return Err(IcebergError::bad_request("Namespace must not be empty"));
    }

    let properties = state
        .ops
        .create_namespace(&request.namespace, request.properties)
        .await?;

    Ok(Json(CreateNamespaceResponse {
        namespace: request.namespace,
        properties,
    }))
}

/// Load namespace metadata.
#[utoipa::path(
    get,
    path = "/v1/{prefix}/namespaces/{namespace}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)")
    ),
    responses(
        (status = 200, description = "Namespace loaded", body = GetNamespaceResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Namespaces"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace))]
async fn get_namespace(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
) -> IcebergResult<Json<GetNamespaceResponse>> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;
    let properties = state.ops.load_namespace(&namespace).await?;
    Ok(Json(GetNamespaceResponse::new(namespace, properties)))
}

/// Check whether a namespace exists.
#[utoipa::path(
    head,
    path = "/v1/{prefix}/namespaces/{namespace}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)")
    ),
    responses(
        (status = 204, description = "Namespace exists"),
        (status = 404, description = "Namespace not found"),
    ),
    tag = "Namespaces"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace))]
async fn head_namespace(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
) -> IcebergResult<StatusCode> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;
    if state.ops.namespace_exists(&namespace).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(IcebergError::namespace_not_found(&namespace_display(&namespace)))
    }
}

/// Drop an empty namespace.
#[utoipa::path(
    delete,
    path = "/v1/{prefix}/namespaces/{namespace}",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)")
    ),
    responses(
        (status = 204, description = "Namespace dropped"),
        (status = 404, description = "Namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 409, description = "Namespace not empty", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Namespaces"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace))]
async fn drop_namespace(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
) -> IcebergResult<StatusCode> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;
    state.ops.drop_namespace(&namespace).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set or remove namespace properties.
#[utoipa::path(
    post,
    path = "/v1/{prefix}/namespaces/{namespace}/properties",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ("namespace" = String, Path, description = "Namespace levels joined by the unit separator (%1F)")
    ),
    request_body = UpdateNamespacePropertiesRequest,
    responses(
        (status = 200, description = "Properties updated", body = UpdateNamespacePropertiesResponse),
        (status = 400, description = "Bad request", body = crate::error::IcebergErrorResponse),
        (status = 404, description = "Namespace not found", body = crate::error::IcebergErrorResponse),
        (status = 422, description = "Key both set and removed", body = crate::error::IcebergErrorResponse),
        (status = 503, description = "Service unavailable", body = crate::error::IcebergErrorResponse),
        (status = 500, description = "Internal error", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Namespaces"
)]
#[instrument(skip_all, fields(request_id = %ctx.request_id, prefix = %path.prefix, namespace = %path.namespace))]
async fn update_namespace_properties(
    Extension(ctx): Extension<IcebergRequestContext>,
    State(state): State<IcebergState>,
    Path(path): Path<NamespacePath>,
    IcebergJson(request): IcebergJson<UpdateNamespacePropertiesRequest>,
) -> IcebergResult<Json<UpdateNamespacePropertiesResponse>> {
    state.config.check_prefix(&path.prefix)?;
    let namespace = parse_namespace(&path.namespace, &state.config.namespace_separator_decoded())?;
    let result = state
        .ops
        .update_namespace_properties(&namespace, &request)
        .await?;

    Ok(Json(UpdateNamespacePropertiesResponse {
        updated: result.updated,
        removed: result.removed,
        missing: (!result.missing.is_empty()).then_some(result.missing),
    }))
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

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("request failed");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_and_get_namespace() {
        let app = app(test_state(IcebergConfig::default()));
        let (status, json) = send(
            &app,
            "POST",
            "/v1/aurora/namespaces",
            Some(r#"{"namespace":["sales"],"properties":{"owner":"ana"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespace"], serde_json::json!(["sales"]));

        let (status, json) = send(&app, "GET", "/v1/aurora/namespaces/sales", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["properties"]["owner"], "ana");

        let (status, json) = send(
            &app,
            "POST",
            "/v1/aurora/namespaces",
            Some(r#"{"namespace":["sales"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["type"], "AlreadyExistsException");
    }

    #[tokio::test]
    async fn test_list_nested_namespaces_with_paging() {
        let app = app(test_state(IcebergConfig::default()));
        for ns in [r#"["a"]"#, r#"["a","x"]"#, r#"["a","y"]"#, r#"["b"]"#] {
            let body = format!(r#"{{"namespace":{ns}}}"#);
            let (status, _) = send(&app, "POST", "/v1/p/namespaces", Some(&body)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, json) = send(&app, "GET", "/v1/p/namespaces?pageSize=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["namespaces"], serde_json::json!([["a"]]));
        assert_eq!(json["next-page-token"], "1");

        let (_, json) = send(&app, "GET", "/v1/p/namespaces?parent=a", None).await;
        assert_eq!(json["namespaces"], serde_json::json!([["a", "x"], ["a", "y"]]));

        let (status, json) = send(&app, "GET", "/v1/p/namespaces?parent=missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["type"], "NoSuchNamespaceException");
    }

    #[tokio::test]
    async fn test_head_and_drop_namespace() {
        let app = app(test_state(IcebergConfig::default()));
        let (status, _) = send(&app, "HEAD", "/v1/p/namespaces/a%1Fb", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(&app, "POST", "/v1/p/namespaces", Some(r#"{"namespace":["a","b"]}"#)).await;
        let (status, _) = send(&app, "HEAD", "/v1/p/namespaces/a%1Fb", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "DELETE", "/v1/p/namespaces/a%1Fb", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, json) = send(&app, "DELETE", "/v1/p/namespaces/a%1Fb", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], 404);
    }

    #[tokio::test]
    async fn test_update_properties() {
        let app = app(test_state(IcebergConfig::default()));
        send(
            &app,
            "POST",
            "/v1/p/namespaces",
            Some(r#"{"namespace":["db"],"properties":{"a":"1","b":"2"}}"#),
        )
        .await;

        let (status, json) = send(
            &app,
            "POST",
            "/v1/p/namespaces/db/properties",
            Some(r#"{"removals":["a","zz"],"updates":{"c":"3"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["updated"], serde_json::json!(["c"]));
        assert_eq!(json["removed"], serde_json::json!(["a"]));
        assert_eq!(json["missing"], serde_json::json!(["zz"]));

        let (status, json) = send(
            &app,
            "POST",
            "/v1/p/namespaces/db/properties",
            Some(r#"{"removals":["c"],"updates":{"c":"4"}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"]["type"], "UnprocessableEntityException");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = app(test_state(IcebergConfig::default()));
        let (status, json) = send(&app, "POST", "/v1/p/namespaces", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["type"], "BadRequestException");
    }

    #[tokio::test]
    async fn test_wrong_prefix_rejected() {
        let config = IcebergConfig {
            prefix: Some("aurora".to_string()),
            ..IcebergConfig::default()
        };
        let app = app(test_state(config));
        let (status, _) = send(&app, "GET", "/v1/other/namespaces", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "GET", "/v1/aurora/namespaces", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
