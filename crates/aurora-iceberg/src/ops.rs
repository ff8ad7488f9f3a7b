//! Catalog operations behind the REST handlers.
//!
//! [`IcebergTableOps`] composes a [`CatalogBackend`] (namespaces and table
//! pointers) with a [`FileIo`] (metadata files). A commit reads the current
//! metadata, checks requirements, applies updates, writes a new metadata
//! file and then swaps the table pointer; losing the swap is a
//! `CommitFailedException`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;

use crate::backend::{CatalogBackend, CatalogError, PropertiesUpdate, TableCommit};
use crate::error::{IcebergError, IcebergResult};
use crate::io::FileIo;
use crate::metadata::{
    apply_updates, default_table_location, empty_metadata, finalize_metadata,
    new_table_metadata, next_metadata_location, validate_created_metadata,
    validate_requirements,
};
use crate::metrics;
use crate::types::{
    CommitTableRequest, CommitTableResponse, CommitTransactionRequest, CreateTableRequest,
    LoadTableResponse, NamespaceIdent, RegisterTableRequest, TableIdent, TableMetadata,
    UpdateNamespacePropertiesRequest, namespace_display,
};

/// A commit that has been validated and applied in memory but not yet
/// written.
#[derive(Debug)]
struct PreparedCommit {
    ident: TableIdent,
    expected_location: Option<String>,
    new_location: String,
    metadata: TableMetadata,
    changed: bool,
}

/// Namespace and table operations over a backend and file IO.
#[derive(Clone)]
pub struct IcebergTableOps {
    backend: Arc<dyn CatalogBackend>,
    io: Arc<dyn FileIo>,
    warehouse: String,
}

impl std::fmt::Debug for IcebergTableOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcebergTableOps")
            .field("backend", &self.backend.name())
            .field("warehouse", &self.warehouse)
            .finish_non_exhaustive()
    }
}

fn validate_namespace(namespace: &NamespaceIdent) -> IcebergResult<()> {
    if namespace.is_empty() || namespace.iter().any(String::is_empty) {
        return Err(IcebergError::bad_request(format!(
            "Invalid namespace: '{}'",
            namespace_display(namespace)
        )));
    }
    Ok(())
}

fn validate_ident(ident: &TableIdent) -> IcebergResult<()> {
    validate_namespace(&ident.namespace)?;
    if ident.name.trim().is_empty() {
        return Err(IcebergError::bad_request("Invalid table name: ''"));
    }
    Ok(())
}

impl IcebergTableOps {
    /// Creates table operations rooted at `warehouse`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CatalogBackend>,
        io: Arc<dyn FileIo>,
        warehouse: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            io,
            warehouse: warehouse.into(),
        }
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Warehouse root for default table locations.
    #[must_use]
    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    // ---------------------------------------------------------------------
    // Namespaces
    // ---------------------------------------------------------------------

    /// Creates a namespace.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExistsException` if the namespace exists.
    pub async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
    ) -> IcebergResult<HashMap<String, String>> {
        validate_namespace(namespace)?;
        self.backend
            .create_namespace(namespace, properties.clone())
            .await?;
        tracing::info!(namespace = %namespace_display(namespace), "Created namespace");
        Ok(properties)
    }

    /// Lists the direct children of `parent`, or top-level namespaces.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchNamespaceException` if the parent does not exist.
    pub async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
    ) -> IcebergResult<Vec<NamespaceIdent>> {
        if let Some(parent) = parent {
            validate_namespace(parent)?;
        }
        Ok(self.backend.list_namespaces(parent).await?)
    }

    /// Loads namespace properties.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchNamespaceException` if the namespace does not exist.
    pub async fn load_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> IcebergResult<HashMap<String, String>> {
        validate_namespace(namespace)?;
        Ok(self.backend.load_namespace(namespace).await?)
    }

    /// Returns true if the namespace exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn namespace_exists(&self, namespace: &NamespaceIdent) -> IcebergResult<bool> {
        validate_namespace(namespace)?;
        Ok(self.backend.namespace_exists(namespace).await?)
    }

    /// Drops an empty namespace.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchNamespaceException` or `NamespaceNotEmptyException`.
    pub async fn drop_namespace(&self, namespace: &NamespaceIdent) -> IcebergResult<()> {
        validate_namespace(namespace)?;
        self.backend.drop_namespace(namespace).await?;
        tracing::info!(namespace = %namespace_display(namespace), "Dropped namespace");
        Ok(())
    }

    /// Sets and removes namespace properties.
    ///
    /// # Errors
    ///
    /// Returns `UnprocessableEntityException` when a key is both set and
    /// removed, or `NoSuchNamespaceException`.
    pub async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        request: &UpdateNamespacePropertiesRequest,
    ) -> IcebergResult<PropertiesUpdate> {
        validate_namespace(namespace)?;
        let overlap = request.overlapping_keys();
        if !overlap.is_empty() {
            return Err(IcebergError::property_overlap(&overlap));
        }
        let result = self
            .backend
            .update_namespace_properties(namespace, &request.removals, &request.updates)
            .await?;
        tracing::info!(
            namespace = %namespace_display(namespace),
            updated = result.updated.len(),
            removed = result.removed.len(),
            "Updated namespace properties"
        );
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // Tables
    // ---------------------------------------------------------------------

    /// Lists tables in a namespace, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchNamespaceException` if the namespace does not exist.
    pub async fn list_tables(&self, namespace: &NamespaceIdent) -> IcebergResult<Vec<TableIdent>> {
        validate_namespace(namespace)?;
        Ok(self.backend.list_tables(namespace).await?)
    }

    /// Returns true if the table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn table_exists(&self, ident: &TableIdent) -> IcebergResult<bool> {
        validate_ident(ident)?;
        Ok(self.backend.load_table(ident).await?.is_some())
    }

    /// Loads a table's current metadata.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchTableException` if the table does not exist.
    pub async fn load_table(&self, ident: &TableIdent) -> IcebergResult<LoadTableResponse> {
        validate_ident(ident)?;
        let entry = self
            .backend
            .load_table(ident)
            .await?
            .ok_or_else(|| IcebergError::table_not_found(&ident.to_string()))?;
        let metadata = self.read_metadata(&entry.metadata_location).await?;
        Ok(LoadTableResponse {
            metadata_location: Some(entry.metadata_location),
            metadata,
            config: HashMap::new(),
        })
    }

    /// Creates a table, or stages it when `stage-create` is set.
    ///
    /// A staged table is returned without a metadata location and is not
    /// visible until a commit with `assert-create` succeeds.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchNamespaceException`, `AlreadyExistsException`, or
    /// `BadRequestException` for invalid requests.
    pub async fn create_table(
        &self,
        namespace: &NamespaceIdent,
        request: CreateTableRequest,
    ) -> IcebergResult<LoadTableResponse> {
        let ident = TableIdent::new(namespace.clone(), request.name.clone());
        validate_ident(&ident)?;
        if !self.backend.namespace_exists(namespace).await? {
            return Err(IcebergError::namespace_not_found(&namespace_display(namespace)));
        }
        if self.backend.load_table(&ident).await?.is_some() {
            return Err(IcebergError::already_exists("Table", &ident.to_string()));
        }

        let location = request
            .location
            .clone()
            .filter(|location| !location.trim().is_empty())
            .unwrap_or_else(|| default_table_location(&self.warehouse, &ident));
        let metadata = new_table_metadata(&request, &location)?;

        if request.stage_create {
            tracing::info!(table = %ident, location = %metadata.location, "Staged table create");
            return Ok(LoadTableResponse {
                metadata_location: None,
                metadata,
                config: HashMap::new(),
            });
        }

        let metadata_location = next_metadata_location(&metadata, None);
        self.write_metadata(&metadata_location, &metadata).await?;
        if let Err(err) = self.backend.create_table(&ident, &metadata_location).await {
            self.discard_metadata(&metadata_location).await;
            return Err(err.into());
        }

        tracing::info!(table = %ident, metadata_location = %metadata_location, "Created table");
        Ok(LoadTableResponse {
            metadata_location: Some(metadata_location),
            metadata,
            config: HashMap::new(),
        })
    }

    /// Registers an existing metadata file as a new table.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchNamespaceException`, `AlreadyExistsException`, or
    /// `NotFoundException` if the metadata file cannot be read.
    pub async fn register_table(
        &self,
        namespace: &NamespaceIdent,
        request: RegisterTableRequest,
    ) -> IcebergResult<LoadTableResponse> {
        let ident = TableIdent::new(namespace.clone(), request.name);
        validate_ident(&ident)?;
        if request.metadata_location.trim().is_empty() {
            return Err(IcebergError::bad_request(
                "Invalid metadata location: must not be empty",
            ));
        }
        if !self.backend.namespace_exists(namespace).await? {
            return Err(IcebergError::namespace_not_found(&namespace_display(namespace)));
        }
        let metadata = self.read_metadata(&request.metadata_location).await?;
        self.backend
            .create_table(&ident, &request.metadata_location)
            .await?;

        tracing::info!(table = %ident, metadata_location = %request.metadata_location, "Registered table");
        Ok(LoadTableResponse {
            metadata_location: Some(request.metadata_location),
            metadata,
            config: HashMap::new(),
        })
    }

    /// Drops a table. With `purge`, its metadata files are deleted as well.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchTableException` if the table does not exist.
    pub async fn drop_table(&self, ident: &TableIdent, purge: bool) -> IcebergResult<()> {
        validate_ident(ident)?;
        // Read before dropping so a purge still knows which files to remove.
        let metadata = if purge {
            match self.backend.load_table(ident).await? {
                Some(entry) => self.read_metadata(&entry.metadata_location).await.ok(),
                None => None,
            }
        } else {
            None
        };

        let entry = self.backend.drop_table(ident).await?;
        tracing::info!(table = %ident, purge, "Dropped table");

        if purge {
            let mut files: Vec<String> = metadata
                .map(|m| m.metadata_log.into_iter().map(|e| e.metadata_file).collect())
                .unwrap_or_default();
            files.push(entry.metadata_location);
            for file in files {
                if let Err(err) = self.io.delete(&file).await {
                    tracing::warn!(table = %ident, file = %file, error = %err, "Failed to purge metadata file");
                }
            }
        }
        Ok(())
    }

    /// Renames a table, possibly across namespaces.
    ///
    /// # Errors
    ///
    /// Returns `NoSuchTableException`, `NoSuchNamespaceException` or
    /// `AlreadyExistsException`.
    pub async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> IcebergResult<()> {
        validate_ident(from)?;
        validate_ident(to)?;
        self.backend.rename_table(from, to).await?;
        tracing::info!(from = %from, to = %to, "Renamed table");
        Ok(())
    }

    /// Commits updates to a single table.
    ///
    /// # Errors
    ///
    /// Returns `CommitFailedException` when a requirement fails or another
    /// writer committed first, `NoSuchTableException` for unknown tables,
    /// and `BadRequestException` for invalid updates.
    pub async fn commit_table(
        &self,
        ident: &TableIdent,
        request: &CommitTableRequest,
    ) -> IcebergResult<CommitTableResponse> {
        validate_ident(ident)?;
        let prepared = self.prepare_commit(ident, request, "commit_table").await?;
        if !prepared.changed {
            return Ok(CommitTableResponse {
                metadata_location: prepared.new_location,
                metadata: prepared.metadata,
            });
        }

        self.write_metadata(&prepared.new_location, &prepared.metadata)
            .await?;
        let commit = TableCommit {
            ident: prepared.ident.clone(),
            expected_location: prepared.expected_location.clone(),
            new_location: prepared.new_location.clone(),
        };
        if let Err(err) = self.backend.commit_tables(&[commit]).await {
            self.discard_metadata(&prepared.new_location).await;
            return Err(self.commit_error(err, "commit_table"));
        }

        tracing::info!(
            table = %ident,
            metadata_location = %prepared.new_location,
            created = prepared.expected_location.is_none(),
            "Committed table update"
        );
        Ok(CommitTableResponse {
            metadata_location: prepared.new_location,
            metadata: prepared.metadata,
        })
    }

    /// Commits updates to several tables atomically.
    ///
    /// Either every table moves to its new metadata or none does.
    ///
    /// # Errors
    ///
    /// Returns `BadRequestException` when a change lacks an identifier or a
    /// table appears twice, and the single-table commit errors otherwise.
    pub async fn commit_transaction(&self, request: &CommitTransactionRequest) -> IcebergResult<()> {
        let mut seen = HashSet::new();
        for change in &request.table_changes {
            let ident = change.identifier.as_ref().ok_or_else(|| {
                IcebergError::bad_request("Invalid table changes: table identifier is required")
            })?;
            validate_ident(ident)?;
            if !seen.insert(ident.clone()) {
                return Err(IcebergError::bad_request(format!(
                    "Invalid table changes: table {ident} appears more than once"
                )));
            }
        }

        let mut prepared = Vec::with_capacity(request.table_changes.len());
        for change in &request.table_changes {
            if let Some(ident) = &change.identifier {
                prepared.push(
                    self.prepare_commit(ident, change, "commit_transaction")
                        .await?,
                );
            }
        }
        let prepared: Vec<PreparedCommit> = prepared.into_iter().filter(|p| p.changed).collect();
        if prepared.is_empty() {
            return Ok(());
        }

        let mut written: Vec<String> = Vec::with_capacity(prepared.len());
        for commit in &prepared {
            if let Err(err) = self.write_metadata(&commit.new_location, &commit.metadata).await {
                for location in &written {
                    self.discard_metadata(location).await;
                }
                return Err(err);
            }
            written.push(commit.new_location.clone());
        }

        let commits: Vec<TableCommit> = prepared
            .iter()
            .map(|p| TableCommit {
                ident: p.ident.clone(),
                expected_location: p.expected_location.clone(),
                new_location: p.new_location.clone(),
            })
            .collect();
        if let Err(err) = self.backend.commit_tables(&commits).await {
            for location in &written {
                self.discard_metadata(location).await;
            }
            return Err(self.commit_error(err, "commit_transaction"));
        }

        tracing::info!(tables = commits.len(), "Committed multi-table transaction");
        Ok(())
    }

    /// Readiness probe for the backend.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailableException` if the backend is unreachable.
    pub async fn ping(&self) -> IcebergResult<()> {
        self.backend.ping().await.map_err(|err| IcebergError::ServiceUnavailable {
            message: format!("Catalog backend is not ready: {err}"),
            retry_after_seconds: Some(1),
        })
    }

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub async fn close(&self) -> IcebergResult<()> {
        self.backend.close().await?;
        tracing::info!(backend = self.backend.name(), "Closed catalog backend");
        Ok(())
    }

    async fn prepare_commit(
        &self,
        ident: &TableIdent,
        request: &CommitTableRequest,
        operation: &str,
    ) -> IcebergResult<PreparedCommit> {
        let entry = self.backend.load_table(ident).await?;
        if entry.is_none() && !request.is_create() {
            return Err(IcebergError::table_not_found(&ident.to_string()));
        }
        let base = match &entry {
            Some(entry) => Some(self.read_metadata(&entry.metadata_location).await?),
            None => None,
        };

        if let Err(err) = validate_requirements(base.as_ref(), &request.requirements) {
            metrics::record_commit_conflict(operation, "requirement");
            return Err(err);
        }

        let expected_location = entry.map(|e| e.metadata_location);
        if let (Some(base), Some(location)) = (&base, &expected_location) {
            if request.updates.is_empty() {
                return Ok(PreparedCommit {
                    ident: ident.clone(),
                    expected_location: Some(location.clone()),
                    new_location: location.clone(),
                    metadata: base.clone(),
                    changed: false,
                });
            }
        }

        let mut metadata = base.clone().unwrap_or_else(empty_metadata);
        apply_updates(&mut metadata, &request.updates)?;
        if base.is_none() {
            if metadata.location.is_empty() {
                metadata.location = default_table_location(&self.warehouse, ident);
            }
            validate_created_metadata(&metadata)?;
        }
        finalize_metadata(&mut metadata, base.as_ref(), expected_location.as_deref());
        let new_location = next_metadata_location(&metadata, expected_location.as_deref());

        Ok(PreparedCommit {
            ident: ident.clone(),
            expected_location,
            new_location,
            metadata,
            changed: true,
        })
    }

    fn commit_error(&self, err: CatalogError, operation: &str) -> IcebergError {
        if matches!(err, CatalogError::CommitFailed(_)) {
            metrics::record_commit_conflict(operation, "pointer_cas");
            tracing::warn!(backend = self.backend.name(), operation, error = %err, "Commit lost pointer swap");
        }
        err.into()
    }

    async fn read_metadata(&self, location: &str) -> IcebergResult<TableMetadata> {
        let bytes = self.io.read(location).await?;
        serde_json::from_slice(&bytes).map_err(|e| IcebergError::Internal {
            message: format!("Failed to parse table metadata at {location}: {e}"),
        })
    }

    async fn write_metadata(&self, location: &str, metadata: &TableMetadata) -> IcebergResult<()> {
        let bytes = serde_json::to_vec(metadata).map_err(|e| IcebergError::Internal {
            message: format!("Failed to serialize table metadata: {e}"),
        })?;
        self.io.write(location, Bytes::from(bytes)).await?;
        Ok(())
    }

    async fn discard_metadata(&self, location: &str) {
        if let Err(err) = self.io.delete(location).await {
            tracing::warn!(file = %location, error = %err, "Failed to delete orphaned metadata file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, SqliteBackend};
    use crate::io::{MemoryFileIo, ResolvingFileIo};
    use crate::types::commit::{TableUpdate, UpdateRequirement};
    use crate::types::{Schema, SchemaField};

    fn ns(name: &str) -> NamespaceIdent {
        vec![name.to_string()]
    }

    fn memory_ops() -> IcebergTableOps {
        IcebergTableOps::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryFileIo::new()),
            "memory://warehouse",
        )
    }

    fn create_request(name: &str) -> CreateTableRequest {
        CreateTableRequest {
            name: name.to_string(),
            location: None,
            schema: Schema {
                schema_id: 0,
                schema_type: "struct".to_string(),
                fields: vec![SchemaField {
                    id: 1,
                    name: "id".to_string(),
                    required: true,
                    field_type: serde_json::json!("long"),
                    doc: None,
                }],
                identifier_field_ids: None,
            },
            partition_spec: None,
            write_order: None,
            stage_create: false,
            properties: HashMap::new(),
        }
    }

    fn set_property(key: &str, value: &str) -> TableUpdate {
        TableUpdate::SetProperties {
            updates: HashMap::from([(key.to_string(), value.to_string())]),
        }
    }

    async fn setup(ops: &IcebergTableOps) -> TableIdent {
        ops.create_namespace(&ns("db"), HashMap::new())
            .await
            .expect("namespace");
        ops.create_table(&ns("db"), create_request("events"))
            .await
            .expect("table");
        TableIdent::simple("db", "events")
    }

    #[tokio::test]
    async fn test_create_and_load_table() {
        let ops = memory_ops();
        let ident = setup(&ops).await;

        let loaded = ops.load_table(&ident).await.expect("load");
        let location = loaded.metadata_location.expect("location");
        assert!(location.starts_with("memory://warehouse/db/events/metadata/00000-"));
        assert_eq!(loaded.metadata.location, "memory://warehouse/db/events");

        let err = ops
            .create_table(&ns("db"), create_request("events"))
            .await
            .expect_err("duplicate");
        assert_eq!(err.error_type(), "AlreadyExistsException");
    }

    #[tokio::test]
    async fn test_create_table_in_missing_namespace() {
        let ops = memory_ops();
        let err = ops
            .create_table(&ns("missing"), create_request("t"))
            .await
            .expect_err("no namespace");
        assert_eq!(err.error_type(), "NoSuchNamespaceException");
    }

    #[tokio::test]
    async fn test_commit_advances_version_and_metadata_log() {
        let ops = memory_ops();
        let ident = setup(&ops).await;
        let before = ops.load_table(&ident).await.expect("load");

        let response = ops
            .commit_table(
                &ident,
                &CommitTableRequest {
                    identifier: None,
                    requirements: vec![UpdateRequirement::AssertTableUuid {
                        uuid: *before.metadata.table_uuid.as_uuid(),
                    }],
                    updates: vec![set_property("owner", "ops")],
                },
            )
            .await
            .expect("commit");

        assert!(response.metadata_location.contains("/metadata/00001-"));
        assert_eq!(response.metadata.metadata_log.len(), 1);
        assert_eq!(
            Some(response.metadata.metadata_log[0].metadata_file.clone()),
            before.metadata_location
        );
        let after = ops.load_table(&ident).await.expect("reload");
        assert_eq!(after.metadata_location, Some(response.metadata_location));
        assert_eq!(
            after.metadata.properties.get("owner").map(String::as_str),
            Some("ops")
        );
    }

    #[tokio::test]
    async fn test_commit_with_failed_requirement() {
        let ops = memory_ops();
        let ident = setup(&ops).await;
        let err = ops
            .commit_table(
                &ident,
                &CommitTableRequest {
                    identifier: None,
                    requirements: vec![UpdateRequirement::AssertCurrentSchemaId {
                        current_schema_id: 9,
                    }],
                    updates: vec![set_property("owner", "ops")],
                },
            )
            .await
            .expect_err("stale");
        assert_eq!(err.error_type(), "CommitFailedException");
    }

    #[tokio::test]
    async fn test_commit_missing_table() {
        let ops = memory_ops();
        ops.create_namespace(&ns("db"), HashMap::new())
            .await
            .expect("namespace");
        let err = ops
            .commit_table(
                &TableIdent::simple("db", "ghost"),
                &CommitTableRequest {
                    identifier: None,
                    requirements: vec![],
                    updates: vec![set_property("a", "b")],
                },
            )
            .await
            .expect_err("missing");
        assert_eq!(err.error_type(), "NoSuchTableException");
    }

    #[tokio::test]
    async fn test_staged_create_then_commit() {
        let ops = memory_ops();
        ops.create_namespace(&ns("db"), HashMap::new())
            .await
            .expect("namespace");
        let mut request = create_request("staged");
        request.stage_create = true;
        let staged = ops
            .create_table(&ns("db"), request)
            .await
            .expect("stage");
        assert!(staged.metadata_location.is_none());
        let ident = TableIdent::simple("db", "staged");
        assert!(!ops.table_exists(&ident).await.expect("exists"));

        let schema = staged.metadata.current_schema().cloned().expect("schema");
        let response = ops
            .commit_table(
                &ident,
                &CommitTableRequest {
                    identifier: Some(ident.clone()),
                    requirements: vec![UpdateRequirement::AssertCreate],
                    updates: vec![
                        TableUpdate::AssignUuid {
                            uuid: *staged.metadata.table_uuid.as_uuid(),
                        },
                        TableUpdate::UpgradeFormatVersion { format_version: 2 },
                        TableUpdate::AddSchema {
                            schema,
                            last_column_id: Some(1),
                        },
                        TableUpdate::SetCurrentSchema { schema_id: -1 },
                        TableUpdate::SetLocation {
                            location: staged.metadata.location.clone(),
                        },
                    ],
                },
            )
            .await
            .expect("commit create");
        assert!(response.metadata_location.contains("/metadata/00000-"));
        assert!(ops.table_exists(&ident).await.expect("exists"));

        let again = ops
            .commit_table(
                &ident,
                &CommitTableRequest {
                    identifier: Some(ident.clone()),
                    requirements: vec![UpdateRequirement::AssertCreate],
                    updates: vec![],
                },
            )
            .await
            .expect_err("already created");
        assert_eq!(again.error_type(), "CommitFailedException");
    }

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let ops = memory_ops();
        let a = setup(&ops).await;
        ops.create_table(&ns("db"), create_request("other"))
            .await
            .expect("other");
        let b = TableIdent::simple("db", "other");
        let a_before = ops.load_table(&a).await.expect("a");

        let err = ops
            .commit_transaction(&CommitTransactionRequest {
                table_changes: vec![
                    CommitTableRequest {
                        identifier: Some(a.clone()),
                        requirements: vec![],
                        updates: vec![set_property("k", "v")],
                    },
                    CommitTableRequest {
                        identifier: Some(b.clone()),
                        requirements: vec![UpdateRequirement::AssertDefaultSpecId {
                            default_spec_id: 42,
                        }],
                        updates: vec![set_property("k", "v")],
                    },
                ],
            })
            .await
            .expect_err("second requirement fails");
        assert_eq!(err.error_type(), "CommitFailedException");
        let a_after = ops.load_table(&a).await.expect("a");
        assert_eq!(a_after.metadata_location, a_before.metadata_location);

        ops.commit_transaction(&CommitTransactionRequest {
            table_changes: vec![
                CommitTableRequest {
                    identifier: Some(a.clone()),
                    requirements: vec![],
                    updates: vec![set_property("k", "v")],
                },
                CommitTableRequest {
                    identifier: Some(b.clone()),
                    requirements: vec![],
                    updates: vec![set_property("k", "v")],
                },
            ],
        })
        .await
        .expect("transaction");
        for ident in [&a, &b] {
            let loaded = ops.load_table(ident).await.expect("load");
            assert_eq!(loaded.metadata.properties.get("k").map(String::as_str), Some("v"));
        }
    }

    #[tokio::test]
    async fn test_transaction_requires_identifiers() {
        let ops = memory_ops();
        let err = ops
            .commit_transaction(&CommitTransactionRequest {
                table_changes: vec![CommitTableRequest {
                    identifier: None,
                    requirements: vec![],
                    updates: vec![],
                }],
            })
            .await
            .expect_err("identifier");
        assert_eq!(err.error_type(), "BadRequestException");
    }

    #[tokio::test]
    async fn test_register_and_purge_drop() {
        let ops = memory_ops();
        let ident = setup(&ops).await;
        let loaded = ops.load_table(&ident).await.expect("load");
        let location = loaded.metadata_location.expect("location");

        let registered = ops
            .register_table(
                &ns("db"),
                RegisterTableRequest {
                    name: "events_copy".to_string(),
                    metadata_location: location.clone(),
                },
            )
            .await
            .expect("register");
        assert_eq!(registered.metadata.table_uuid, loaded.metadata.table_uuid);

        ops.drop_table(&ident, true).await.expect("purge");
        let err = ops
            .load_table(&TableIdent::simple("db", "events_copy"))
            .await
            .expect_err("file purged");
        assert_eq!(err.error_type(), "NotFoundException");
    }

    #[tokio::test]
    async fn test_rename_and_namespace_not_empty() {
        let ops = memory_ops();
        let ident = setup(&ops).await;
        ops.create_namespace(&ns("archive"), HashMap::new())
            .await
            .expect("archive");
        let target = TableIdent::simple("archive", "events");
        ops.rename_table(&ident, &target).await.expect("rename");
        assert!(!ops.table_exists(&ident).await.expect("exists"));
        assert!(ops.load_table(&target).await.is_ok());

        let err = ops
            .drop_namespace(&ns("archive"))
            .await
            .expect_err("not empty");
        assert_eq!(err.error_type(), "NamespaceNotEmptyException");
        ops.drop_namespace(&ns("db")).await.expect("empty db");
    }

    #[tokio::test]
    async fn test_update_namespace_properties_overlap() {
        let ops = memory_ops();
        ops.create_namespace(&ns("db"), HashMap::new())
            .await
            .expect("namespace");
        let err = ops
            .update_namespace_properties(
                &ns("db"),
                &UpdateNamespacePropertiesRequest {
                    removals: vec!["a".to_string()],
                    updates: HashMap::from([("a".to_string(), "1".to_string())]),
                },
            )
            .await
            .expect_err("overlap");
        assert_eq!(err.error_type(), "UnprocessableEntityException");
    }

    #[tokio::test]
    async fn test_sqlite_backend_with_local_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = format!("jdbc:sqlite:{}/catalog.db", dir.path().display());
        let ops = IcebergTableOps::new(
            Arc::new(SqliteBackend::open(&uri, true).expect("sqlite")),
            Arc::new(ResolvingFileIo::new()),
            format!("file://{}/warehouse", dir.path().display()),
        );
        let ident = setup(&ops).await;
        ops.commit_table(
            &ident,
            &CommitTableRequest {
                identifier: None,
                requirements: vec![],
                updates: vec![set_property("owner", "ops")],
            },
        )
        .await
        .expect("commit");

        let loaded = ops.load_table(&ident).await.expect("load");
        assert!(
            loaded
                .metadata_location
                .expect("location")
                .contains("/warehouse/db/events/metadata/00001-")
        );
        assert!(ops.ping().await.is_ok());
    }
}
