//! Commit payloads: requirements, updates, and the single-table and
//! transaction request bodies that carry them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::table::{
    PartitionSpec, Schema, Snapshot, SnapshotRefType, SortOrder, TableIdent, TableMetadata,
};

/// A precondition on the current table metadata. Every requirement of a
/// commit must hold before any of its updates is applied.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum UpdateRequirement {
    /// The table must not exist (staged create).
    AssertCreate,
    /// `table-uuid` must equal `uuid`.
    AssertTableUuid { uuid: Uuid },
    /// The named ref must point at `snapshot_id`; `None` means the ref must be absent.
    AssertRefSnapshotId {
        #[serde(rename = "ref")]
        ref_name: String,
        snapshot_id: Option<i64>,
    },
    AssertLastAssignedFieldId { last_assigned_field_id: i32 },
    AssertCurrentSchemaId { current_schema_id: i32 },
    AssertLastAssignedPartitionId { last_assigned_partition_id: i32 },
    AssertDefaultSpecId { default_spec_id: i32 },
    AssertDefaultSortOrderId { default_sort_order_id: i32 },
}

/// One metadata change inside a commit, tagged by `action`.
///
/// For `set-current-schema`, `set-default-spec` and `set-default-sort-order`
/// an id of `-1` means "the one added last in this commit".
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum TableUpdate {
    AssignUuid { uuid: Uuid },
    /// Only upgrades are accepted.
    UpgradeFormatVersion { format_version: i32 },
    AddSchema {
        schema: Schema,
        /// Deprecated by Iceberg but still sent by older clients.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    SetCurrentSchema { schema_id: i32 },
    #[serde(rename = "add-spec")]
    AddPartitionSpec { spec: PartitionSpec },
    SetDefaultSpec { spec_id: i32 },
    AddSortOrder { sort_order: SortOrder },
    SetDefaultSortOrder { sort_order_id: i32 },
    /// Snapshot ids must be unique within the table.
    AddSnapshot { snapshot: Snapshot },
    /// Points a branch or tag at an existing snapshot. Updating `main` also
    /// moves `current-snapshot-id`.
    SetSnapshotRef {
        ref_name: String,
        #[serde(rename = "type")]
        ref_type: SnapshotRefType,
        snapshot_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_ref_age_ms: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_snapshot_age_ms: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_snapshots_to_keep: Option<i32>,
    },
    RemoveSnapshotRef { ref_name: String },
    RemoveSnapshots { snapshot_ids: Vec<i64> },
    SetLocation { location: String },
    SetProperties { updates: HashMap<String, String> },
    RemoveProperties { removals: Vec<String> },
}

/// Request body for `POST /v1/{prefix}/namespaces/{namespace}/tables/{table}`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommitTableRequest {
    /// Target table. Optional on the single-table endpoint (the path names it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<TableIdent>,

    /// Requirements checked against the current metadata.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub requirements: Vec<UpdateRequirement>,

    /// Updates applied when every requirement holds.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub updates: Vec<TableUpdate>,
}

impl CommitTableRequest {
    /// Returns true when the request asserts the table does not exist yet.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.requirements
            .iter()
            .any(|req| matches!(req, UpdateRequirement::AssertCreate))
    }
}

/// Body returned by a single-table commit.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommitTableResponse {
    /// Metadata file written by this commit.
    #[serde(rename = "metadata-location")]
    pub metadata_location: String,
    /// Metadata as committed.
    pub metadata: TableMetadata,
}

/// Request body for `POST /v1/{prefix}/transactions/commit`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommitTransactionRequest {
    /// Per-table commits; each must carry an identifier.
    #[serde(rename = "table-changes")]
    pub table_changes: Vec<CommitTableRequest>,
}
