//! Checks that the served `OpenAPI` document covers the advertised endpoints.

use aurora_iceberg::openapi;
use aurora_iceberg::types::SUPPORTED_ENDPOINTS;

#[test]
fn test_every_advertised_endpoint_is_documented() {
    let doc = openapi();
    for endpoint in SUPPORTED_ENDPOINTS {
        let (method, path) = endpoint.split_once(' ').expect("METHOD /path");
        let item = doc
            .paths
            .paths
            .get(path)
            .unwrap_or_else(|| panic!("{path} missing from OpenAPI document"));
        let json = serde_json::to_value(item).expect("serialize path item");
        assert!(
            json.get(method.to_ascii_lowercase()).is_some(),
            "{endpoint} missing from OpenAPI document"
        );
    }
}

#[test]
fn test_error_model_is_a_component() {
    let json = serde_json::to_value(openapi()).expect("serialize");
    let schemas = &json["components"]["schemas"];
    assert!(schemas.get("IcebergErrorResponse").is_some());
    assert!(schemas.get("LoadTableResponse").is_some());
}
