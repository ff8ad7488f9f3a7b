//! Namespace payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Namespace levels, outermost first. `["sales", "eu"]` prints as `sales.eu`.
pub type NamespaceIdent = Vec<String>;

/// Dotted form used in error messages and logs.
#[must_use]
pub fn namespace_display(namespace: &[String]) -> String {
    namespace.join(".")
}

/// `GET /v1/{prefix}/namespaces`
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ListNamespacesResponse {
    /// One page of namespaces.
    pub namespaces: Vec<NamespaceIdent>,
    /// Present when more namespaces follow.
    #[serde(rename = "next-page-token", skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Query string of the namespace listing.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListNamespacesQuery {
    /// List the children of this namespace (levels joined by `%1F`)
    /// instead of the top level.
    #[serde(default)]
    pub parent: Option<String>,
    /// Offset returned as `next-page-token` by the previous page.
    pub page_token: Option<String>,
    /// Page size; must be positive.
    pub page_size: Option<u32>,
}

/// `POST /v1/{prefix}/namespaces` body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateNamespaceRequest {
    /// Levels of the new namespace.
    pub namespace: NamespaceIdent,
    #[serde(default)]
    /// Properties stored at creation.
    pub properties: HashMap<String, String>,
}

/// `POST /v1/{prefix}/namespaces` result: the namespace as stored.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateNamespaceResponse {
    /// Levels of the created namespace.
    pub namespace: NamespaceIdent,
    #[serde(default)]
    /// Properties stored at creation.
    pub properties: HashMap<String, String>,
}

/// `GET /v1/{prefix}/namespaces/{namespace}`
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GetNamespaceResponse {
    /// Levels of the loaded namespace.
    pub namespace: NamespaceIdent,
    #[serde(default)]
    /// Current properties.
    pub properties: HashMap<String, String>,
}

impl GetNamespaceResponse {
    /// Pairs a namespace with its properties.
    #[must_use]
    pub fn new(namespace: NamespaceIdent, properties: HashMap<String, String>) -> Self {
        Self {
            namespace,
            properties,
        }
    }
}

/// `POST /v1/{prefix}/namespaces/{namespace}/properties` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UpdateNamespacePropertiesRequest {
    /// Keys to delete.
    #[serde(default)]
    pub removals: Vec<String>,
    /// Keys to add or overwrite.
    #[serde(default)]
    pub updates: HashMap<String, String>,
}

impl UpdateNamespacePropertiesRequest {
    /// Keys named in both `removals` and `updates`, sorted and deduplicated.
    /// A non-empty result makes the request unprocessable.
    #[must_use]
    pub fn overlapping_keys(&self) -> Vec<String> {
        let mut overlap: Vec<String> = self
            .removals
            .iter()
            .filter(|key| self.updates.contains_key(*key))
            .cloned()
            .collect();
        overlap.sort();
        overlap.dedup();
        overlap
    }
}

/// Outcome of a property update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UpdateNamespacePropertiesResponse {
    /// Keys written.
    pub updated: Vec<String>,
    /// Keys deleted.
    pub removed: Vec<String>,
    /// Requested removals that were not set; omitted when there are none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_token_only_when_more_pages() {
        let page = ListNamespacesResponse {
            namespaces: vec![vec!["sales".to_string()], vec!["sales".into(), "eu".into()]],
            next_page_token: Some("2".to_string()),
        };
        let json = serde_json::to_value(&page).expect("serialize");
        assert_eq!(json["namespaces"][1], serde_json::json!(["sales", "eu"]));
        assert_eq!(json["next-page-token"], "2");

        let last = ListNamespacesResponse {
            namespaces: vec![],
            next_page_token: None,
        };
        let json = serde_json::to_value(&last).expect("serialize");
        assert!(json.get("next-page-token").is_none());
    }

    #[test]
    fn test_list_query_uses_camel_case() {
        let query: ListNamespacesQuery =
            serde_json::from_str(r#"{"parent":"sales","pageToken":"4","pageSize":2}"#)
                .expect("deserialize");
        assert_eq!(query.parent.as_deref(), Some("sales"));
        assert_eq!(query.page_token.as_deref(), Some("4"));
        assert_eq!(query.page_size, Some(2));
    }

    #[test]
    fn test_create_request_without_properties() {
        let req: CreateNamespaceRequest =
            serde_json::from_str(r#"{"namespace":["prod","sales"]}"#).expect("deserialize");
        assert_eq!(req.namespace, vec!["prod", "sales"]);
        assert!(req.properties.is_empty());
    }

    #[test]
    fn test_overlapping_keys() {
        let req = UpdateNamespacePropertiesRequest {
            removals: vec!["owner".to_string(), "b".to_string(), "owner".to_string()],
            updates: HashMap::from([("owner".to_string(), "x".to_string())]),
        };
        assert_eq!(req.overlapping_keys(), vec!["owner".to_string()]);
        assert!(UpdateNamespacePropertiesRequest::default()
            .overlapping_keys()
            .is_empty());
    }

    #[test]
    fn test_missing_omitted_when_none() {
        let response = UpdateNamespacePropertiesResponse {
            updated: vec!["a".to_string()],
            removed: vec![],
            missing: None,
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json.get("missing").is_none());
    }

    #[test]
    fn test_namespace_display() {
        assert_eq!(namespace_display(&["a".to_string(), "b".to_string()]), "a.b");
    }
}
