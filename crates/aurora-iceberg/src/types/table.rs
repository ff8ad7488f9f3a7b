//! Table payloads and the Iceberg table metadata model.
//!
//! Metadata structs mirror the table metadata JSON written to
//! `<location>/metadata/*.metadata.json`; field names on the wire are
//! kebab-case.

use super::ids::TableUuid;
use super::namespace::{NamespaceIdent, namespace_display};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Namespace plus table name.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
pub struct TableIdent {
    /// Enclosing namespace.
    pub namespace: NamespaceIdent,
    /// Table name within the namespace.
    pub name: String,
}

impl TableIdent {
    /// Builds an identifier from namespace levels and a name.
    #[must_use]
    pub fn new(namespace: NamespaceIdent, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Shorthand for a table in a one-level namespace.
    #[must_use]
    pub fn simple(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(vec![namespace.into()], name)
    }
}

impl std::fmt::Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", namespace_display(&self.namespace), self.name)
    }
}

/// `GET /v1/{prefix}/namespaces/{namespace}/tables`
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ListTablesResponse {
    /// One page of tables, sorted by name.
    pub identifiers: Vec<TableIdent>,
    /// Present when more tables follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Query string of the table listing.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesQuery {
    /// Offset returned by the previous page.
    pub page_token: Option<String>,
    /// Page size; must be positive.
    pub page_size: Option<u32>,
}

/// Query string of `DELETE .../tables/{table}`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DropTableQuery {
    /// Also delete the metadata files the table references.
    #[serde(default)]
    pub purge_requested: bool,
}

/// Returned by load, create and register.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct LoadTableResponse {
    /// Current metadata file. `None` for a staged create, which has written
    /// nothing yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_location: Option<String>,
    /// Metadata inline.
    pub metadata: TableMetadata,
    /// Per-table client configuration.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, String>,
}

/// `POST /v1/{prefix}/namespaces/{namespace}/tables` body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct CreateTableRequest {
    /// Name of the new table.
    pub name: String,
    /// Table root; the warehouse layout is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Initial schema.
    pub schema: Schema,
    /// Partitioning; field ids may be left for the server to assign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_spec: Option<UnboundPartitionSpec>,
    /// Initial sort order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_order: Option<SortOrder>,
    /// Build metadata but do not create the catalog entry.
    #[serde(default)]
    pub stage_create: bool,
    /// Table properties. `format-version` is consumed, not stored.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// `POST /v1/{prefix}/namespaces/{namespace}/register` body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct RegisterTableRequest {
    /// Name to register the table under.
    pub name: String,
    /// Existing metadata file to adopt.
    pub metadata_location: String,
}

/// `POST /v1/{prefix}/tables/rename` body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RenameTableRequest {
    /// Table to move.
    pub source: TableIdent,
    /// New identifier; may be in another namespace.
    pub destination: TableIdent,
}

/// Iceberg table metadata (format v1 and v2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    /// 1 or 2.
    pub format_version: i32,
    /// Assigned once at creation; guards against a table being replaced.
    pub table_uuid: TableUuid,
    /// Root of data and metadata.
    pub location: String,
    /// Always 0 for v1 tables.
    #[serde(default)]
    pub last_sequence_number: i64,
    /// Milliseconds since the epoch.
    pub last_updated_ms: i64,
    /// Highest column id assigned so far, nested fields included.
    pub last_column_id: i32,
    /// Id of the schema in `schemas` that reads use.
    pub current_schema_id: i32,
    /// Every schema the table has had.
    pub schemas: Vec<Schema>,
    /// Files that store `-1` for "no snapshot" read as `None`.
    #[serde(default, deserialize_with = "deserialize_snapshot_id")]
    pub current_snapshot_id: Option<i64>,
    /// Valid snapshots.
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    /// History of `current-snapshot-id`.
    #[serde(default)]
    pub snapshot_log: Vec<SnapshotLogEntry>,
    /// Previous metadata files, oldest first.
    #[serde(default)]
    pub metadata_log: Vec<MetadataLogEntry>,
    /// Table properties.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Spec id new data is written with.
    #[serde(default)]
    pub default_spec_id: i32,
    /// Every partition spec the table has had.
    #[serde(default)]
    pub partition_specs: Vec<PartitionSpec>,
    /// Highest partition field id assigned so far (999 when none).
    #[serde(default)]
    pub last_partition_id: i32,
    /// Branches and tags by name.
    #[serde(default)]
    pub refs: HashMap<String, SnapshotRefMetadata>,
    /// Order id new data is written with; 0 is unsorted.
    #[serde(default)]
    pub default_sort_order_id: i32,
    /// Every sort order the table has had.
    #[serde(default)]
    pub sort_orders: Vec<SortOrder>,
}

fn deserialize_snapshot_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.filter(|id| *id != -1))
}

impl TableMetadata {
    /// Schema named by `current-schema-id`.
    #[must_use]
    pub fn current_schema(&self) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|schema| schema.schema_id == self.current_schema_id)
    }

    /// Looks a snapshot up by id.
    #[must_use]
    pub fn snapshot(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
    }
}

/// A table schema: a struct type with an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Schema {
    /// Unique within the table.
    #[serde(default)]
    pub schema_id: i32,
    /// Always `struct`.
    #[serde(rename = "type", default = "struct_type")]
    pub schema_type: String,
    /// Top-level columns.
    #[serde(default)]
    pub fields: Vec<SchemaField>,
    /// Columns that identify a row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_field_ids: Option<Vec<i32>>,
}

fn struct_type() -> String {
    "struct".to_string()
}

impl Schema {
    /// Largest field id anywhere in the schema, looking inside struct, list
    /// and map types; 0 when there are no fields.
    #[must_use]
    pub fn highest_field_id(&self) -> i32 {
        self.fields
            .iter()
            .map(|field| field.id.max(nested_max_id(&field.field_type)))
            .max()
            .unwrap_or(0)
    }

    /// Equal columns and identifier fields; the schema id is not compared.
    #[must_use]
    pub fn same_structure(&self, other: &Self) -> bool {
        self.fields == other.fields && self.identifier_field_ids == other.identifier_field_ids
    }
}

fn nested_max_id(field_type: &Value) -> i32 {
    let Value::Object(obj) = field_type else {
        return 0;
    };
    let ids = ["id", "element-id", "key-id", "value-id"]
        .into_iter()
        .filter_map(|key| obj.get(key).and_then(Value::as_i64))
        .map(|id| i32::try_from(id).unwrap_or(i32::MAX));
    let children = ["type", "element", "key", "value"]
        .into_iter()
        .filter_map(|key| obj.get(key))
        .chain(
            obj.get("fields")
                .and_then(Value::as_array)
                .into_iter()
                .flatten(),
        )
        .map(nested_max_id);
    ids.chain(children).max().unwrap_or(0)
}

/// One column. `type` is either a primitive name or a nested type object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SchemaField {
    /// Column id.
    pub id: i32,
    /// Column name.
    pub name: String,
    /// Whether nulls are rejected.
    pub required: bool,
    /// Primitive name (`long`) or nested `struct`/`list`/`map` object.
    #[serde(rename = "type")]
    pub field_type: Value,
    /// Column comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// A table state produced by one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    /// Unique within the table.
    pub snapshot_id: i64,
    /// Snapshot this one was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    /// v2 data sequence number.
    #[serde(default)]
    pub sequence_number: i64,
    /// Creation time in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Location of the manifest list.
    pub manifest_list: String,
    /// Operation and counters written by the engine.
    #[serde(default)]
    pub summary: HashMap<String, String>,
    /// Schema current when the snapshot was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
}

/// `snapshot-log` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotLogEntry {
    /// Snapshot that became current.
    pub snapshot_id: i64,
    /// When it became current.
    pub timestamp_ms: i64,
}

/// `metadata-log` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct MetadataLogEntry {
    /// A superseded metadata file.
    pub metadata_file: String,
    /// `last-updated-ms` of that file.
    pub timestamp_ms: i64,
}

/// A partition spec with assigned field ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    /// Unique within the table.
    pub spec_id: i32,
    /// Partition fields; empty means unpartitioned.
    #[serde(default)]
    pub fields: Vec<PartitionField>,
}

/// One partition field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionField {
    /// Starts at 1000.
    pub field_id: i32,
    /// Column the value is derived from.
    pub source_id: i32,
    /// Partition column name.
    pub name: String,
    /// `identity`, `bucket[N]`, `truncate[W]`, `day`, ...
    pub transform: String,
}

/// A partition spec as sent on create, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct UnboundPartitionSpec {
    /// Ignored; a new table always starts at spec 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<i32>,
    /// Partition fields.
    #[serde(default)]
    pub fields: Vec<UnboundPartitionField>,
}

/// Partition field whose id the server may assign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct UnboundPartitionField {
    /// Column the value is derived from.
    pub source_id: i32,
    /// Assigned from 1000 upwards when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<i32>,
    /// Partition column name.
    pub name: String,
    /// Partition transform.
    pub transform: String,
}

/// Branch or tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotRefType {
    /// Can be moved by later commits.
    Branch,
    /// Fixed to one snapshot.
    Tag,
}

/// Value of the `refs` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotRefMetadata {
    /// Snapshot the ref points at.
    pub snapshot_id: i64,
    /// Branch or tag.
    #[serde(rename = "type")]
    pub ref_type: SnapshotRefType,
    /// Retention of the ref itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ref_age_ms: Option<i64>,
    /// Branch snapshot retention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snapshot_age_ms: Option<i64>,
    /// Branch snapshot retention floor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_snapshots_to_keep: Option<i32>,
}

/// A sort order; order 0 is reserved for unsorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SortOrder {
    /// Unique within the table.
    #[serde(default)]
    pub order_id: i32,
    /// Sort keys, most significant first.
    #[serde(default)]
    pub fields: Vec<SortField>,
}

impl SortOrder {
    /// Order 0 with no fields.
    #[must_use]
    pub fn unsorted() -> Self {
        Self {
            order_id: 0,
            fields: Vec::new(),
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SortField {
    /// Column sorted on.
    pub source_id: i32,
    /// Transform applied before comparing.
    pub transform: String,
    /// `asc` or `desc`.
    pub direction: String,
    /// `nulls-first` or `nulls-last`.
    pub null_order: String,
}
