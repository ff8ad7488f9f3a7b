//! Handlers for `/v1/config` and `/v1/{prefix}/config`.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::IcebergResult;
use crate::routes::utils::IcebergQuery;
use crate::state::IcebergState;
use crate::types::{ConfigQuery, ConfigResponse};

/// Handler for `GET /v1/config`.
///
/// Returns catalog defaults, overrides (the prefix when one is configured)
/// and the endpoints this server implements.
#[utoipa::path(
    get,
    path = "/v1/config",
    params(ConfigQuery),
    responses(
        (status = 200, description = "Catalog configuration", body = ConfigResponse)
    ),
    tag = "Configuration"
)]
pub async fn get_config(
    State(state): State<IcebergState>,
    IcebergQuery(_query): IcebergQuery<ConfigQuery>,
) -> Json<ConfigResponse> {
    Json(ConfigResponse::from_config(&state.config))
}

/// Handler for `GET /v1/{prefix}/config`.
#[utoipa::path(
    get,
    path = "/v1/{prefix}/config",
    params(
        ("prefix" = String, Path, description = "Catalog prefix"),
        ConfigQuery
    ),
    responses(
        (status = 200, description = "Catalog configuration", body = ConfigResponse),
        (status = 400, description = "Unknown prefix", body = crate::error::IcebergErrorResponse),
    ),
    tag = "Configuration"
)]
pub async fn get_prefixed_config(
    State(state): State<IcebergState>,
    Path(prefix): Path<String>,
    IcebergQuery(_query): IcebergQuery<ConfigQuery>,
) -> IcebergResult<Json<ConfigResponse>> {
    state.config.check_prefix(&prefix)?;
    Ok(Json(ConfigResponse::from_config(&state.config)))
}
