//! `OpenAPI` document generation for the Iceberg REST Catalog.
//!
//! The document is served at `/openapi.json` and can be diffed against the
//! upstream Iceberg REST specification.

use utoipa::OpenApi;

/// `OpenAPI` documentation for the Iceberg REST Catalog API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Iceberg REST Catalog API",
        description = "Apache Iceberg REST Catalog API served by Aurora.",
        license(
            name = "Apache-2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    paths(
        crate::routes::config::get_config,
        crate::routes::config::get_prefixed_config,
        crate::routes::namespaces::list_namespaces,
        crate::routes::namespaces::create_namespace,
        crate::routes::namespaces::get_namespace,
        crate::routes::namespaces::head_namespace,
        crate::routes::namespaces::drop_namespace,
        crate::routes::namespaces::update_namespace_properties,
        crate::routes::tables::list_tables,
        crate::routes::tables::create_table,
        crate::routes::tables::register_table,
        crate::routes::tables::load_table,
        crate::routes::tables::head_table,
        crate::routes::tables::commit_table,
        crate::routes::tables::drop_table,
        crate::routes::metrics_report::report_metrics,
        crate::routes::catalog::rename_table,
        crate::routes::catalog::commit_transaction,
    ),
    components(
        schemas(
            crate::types::ConfigResponse,
            crate::types::ListNamespacesResponse,
            crate::types::CreateNamespaceRequest,
            crate::types::CreateNamespaceResponse,
            crate::types::GetNamespaceResponse,
            crate::types::UpdateNamespacePropertiesRequest,
            crate::types::UpdateNamespacePropertiesResponse,
            crate::types::ListTablesResponse,
            crate::types::CreateTableRequest,
            crate::types::RegisterTableRequest,
            crate::types::RenameTableRequest,
            crate::types::LoadTableResponse,
            crate::types::CommitTableRequest,
            crate::types::CommitTableResponse,
            crate::types::CommitTransactionRequest,
            crate::types::TableIdent,
            crate::types::TableMetadata,
            crate::types::Schema,
            crate::types::SchemaField,
            crate::types::PartitionSpec,
            crate::types::PartitionField,
            crate::types::UnboundPartitionSpec,
            crate::types::UnboundPartitionField,
            crate::types::SortOrder,
            crate::types::SortField,
            crate::types::Snapshot,
            crate::types::SnapshotLogEntry,
            crate::types::MetadataLogEntry,
            crate::types::SnapshotRefType,
            crate::types::SnapshotRefMetadata,
            crate::types::TableUuid,
            crate::error::IcebergErrorResponse,
            crate::error::IcebergErrorDetail,
        )
    ),
    tags(
        (name = "Configuration", description = "Catalog configuration endpoint"),
        (name = "Namespaces", description = "Namespace management operations"),
        (name = "Tables", description = "Table management, loading and commits"),
        (name = "Catalog", description = "Rename and multi-table transactions"),
    ),
)]
pub struct IcebergApiDoc;

/// Returns the generated `OpenAPI` document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    IcebergApiDoc::openapi()
}

/// Returns the generated `OpenAPI` document serialized as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn openapi_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&openapi())
}
