//! Configuration types for `/v1/config` endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::IcebergConfig;

/// Endpoints served by the catalog, in Iceberg's `"METHOD /path"` notation.
pub const SUPPORTED_ENDPOINTS: &[&str] = &[
    "GET /v1/{prefix}/namespaces",
    "POST /v1/{prefix}/namespaces",
    "GET /v1/{prefix}/namespaces/{namespace}",
    "HEAD /v1/{prefix}/namespaces/{namespace}",
    "DELETE /v1/{prefix}/namespaces/{namespace}",
    "POST /v1/{prefix}/namespaces/{namespace}/properties",
    "GET /v1/{prefix}/namespaces/{namespace}/tables",
    "POST /v1/{prefix}/namespaces/{namespace}/tables",
    "GET /v1/{prefix}/namespaces/{namespace}/tables/{table}",
    "HEAD /v1/{prefix}/namespaces/{namespace}/tables/{table}",
    "POST /v1/{prefix}/namespaces/{namespace}/tables/{table}",
    "DELETE /v1/{prefix}/namespaces/{namespace}/tables/{table}",
    "POST /v1/{prefix}/namespaces/{namespace}/register",
    "POST /v1/{prefix}/namespaces/{namespace}/tables/{table}/metrics",
    "POST /v1/{prefix}/tables/rename",
    "POST /v1/{prefix}/transactions/commit",
];

/// Response from the `/v1/config` endpoint.
///
/// Provides client configuration including catalog defaults, overrides,
/// and supported endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ConfigResponse {
    /// Default configuration values (may be overridden by client).
    #[serde(default)]
    pub defaults: HashMap<String, String>,

    /// Configuration overrides (client must use these values).
    #[serde(default)]
    pub overrides: HashMap<String, String>,

    /// List of supported endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<String>>,
}

/// Query parameters for `/v1/config`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct ConfigQuery {
    /// Warehouse requested by the client. Accepted and ignored.
    pub warehouse: Option<String>,
}

impl ConfigResponse {
    /// Creates the configuration response from server config.
    #[must_use]
    pub fn from_config(config: &IcebergConfig) -> Self {
        let mut overrides = HashMap::new();
        if let Some(prefix) = &config.prefix {
            overrides.insert("prefix".to_string(), prefix.clone());
        }
        Self {
            defaults: HashMap::new(),
            overrides,
            endpoints: Some(SUPPORTED_ENDPOINTS.iter().map(ToString::to_string).collect()),
        }
    }
}
