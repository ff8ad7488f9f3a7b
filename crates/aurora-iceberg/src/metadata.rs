//! Table metadata engine: building new metadata, checking commit
//! requirements, and applying updates.
//!
//! Everything here is pure; reading and writing metadata files and swapping
//! catalog pointers happen in [`crate::ops`].

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::error::{IcebergError, IcebergResult};
use crate::types::commit::{TableUpdate, UpdateRequirement};
use crate::types::{
    CreateTableRequest, MetadataLogEntry, PartitionField, PartitionSpec,
    SnapshotLogEntry, SnapshotRefMetadata, SortOrder, TableIdent, TableMetadata, TableUuid,
};

/// Table property selecting the format version at create time.
pub const FORMAT_VERSION_PROPERTY: &str = "format-version";

/// Table property bounding the metadata log length.
pub const PREVIOUS_VERSIONS_MAX_PROPERTY: &str = "write.metadata.previous-versions-max";

/// Metadata log length when the property is absent or invalid.
pub const DEFAULT_PREVIOUS_VERSIONS_MAX: usize = 100;

/// Format version used when none is requested.
pub const DEFAULT_FORMAT_VERSION: i32 = 2;

/// Highest supported format version.
pub const MAX_FORMAT_VERSION: i32 = 2;

/// First ID handed to partition fields.
const PARTITION_DATA_ID_START: i32 = 1000;

const MAIN_BRANCH: &str = "main";

/// Returns the default location of a table under `warehouse`.
#[must_use]
pub fn default_table_location(warehouse: &str, ident: &TableIdent) -> String {
    let mut location = warehouse.trim_end_matches('/').to_string();
    for level in &ident.namespace {
        location.push('/');
        location.push_str(level);
    }
    location.push('/');
    location.push_str(&ident.name);
    location
}

/// Builds the metadata location for `version` under `table_location`.
#[must_use]
pub fn metadata_file_location(table_location: &str, version: u64) -> String {
    format!(
        "{}/metadata/{version:05}-{}.metadata.json",
        table_location.trim_end_matches('/'),
        uuid::Uuid::new_v4()
    )
}

/// Parses the version prefix of a metadata file name.
///
/// Accepts `00003-<uuid>.metadata.json` and `v3.metadata.json`.
#[must_use]
pub fn parse_metadata_version(location: &str) -> Option<u64> {
    let file_name = location.rsplit('/').next()?;
    let stem = file_name.strip_suffix(".metadata.json")?;
    let digits = stem.split('-').next()?;
    let digits = digits.strip_prefix('v').unwrap_or(digits);
    digits.parse().ok()
}

/// Picks the location of the next metadata file for `metadata`.
#[must_use]
pub fn next_metadata_location(metadata: &TableMetadata, previous: Option<&str>) -> String {
    let version = previous
        .and_then(parse_metadata_version)
        .map_or(0, |version| version + 1);
    metadata_file_location(&metadata.location, version)
}

/// Builds metadata for a new table.
///
/// # Errors
///
/// Returns `BadRequest` if the requested format version is unsupported or
/// partition field ids run past `i32::MAX`.
pub fn new_table_metadata(
    request: &CreateTableRequest,
    location: &str,
) -> IcebergResult<TableMetadata> {
    let mut properties = request.properties.clone();
    let format_version = match properties.remove(FORMAT_VERSION_PROPERTY) {
        None => DEFAULT_FORMAT_VERSION,
        Some(raw) => match raw.trim().parse::<i32>() {
            Ok(version @ 1..=MAX_FORMAT_VERSION) => version,
            _ => {
                return Err(IcebergError::bad_request(format!(
                    "Unsupported format version: {raw}"
                )));
            }
        },
    };

    let mut schema = request.schema.clone();
    schema.schema_id = 0;
    let last_column_id = schema.highest_field_id();

    let mut next_partition_id = Some(PARTITION_DATA_ID_START);
    let mut partition_fields = Vec::new();
    for field in request.partition_spec.iter().flat_map(|spec| &spec.fields) {
        let field_id = match field.field_id {
            Some(id) => id,
            None => next_partition_id.ok_or_else(|| id_overflow("partition field"))?,
        };
        if next_partition_id.is_some_and(|next| field_id >= next) {
            next_partition_id = field_id.checked_add(1);
        }
        partition_fields.push(PartitionField {
            field_id,
            source_id: field.source_id,
            name: field.name.clone(),
            transform: field.transform.clone(),
        });
    }
    let last_partition_id = partition_fields
        .iter()
        .map(|field| field.field_id)
        .max()
        .unwrap_or(PARTITION_DATA_ID_START - 1);

    let sort_order = match &request.write_order {
        Some(order) if !order.fields.is_empty() => SortOrder {
            order_id: 1,
            fields: order.fields.clone(),
        },
        _ => SortOrder::unsorted(),
    };

    Ok(TableMetadata {
        format_version,
        table_uuid: TableUuid::random(),
        location: location.trim_end_matches('/').to_string(),
        last_sequence_number: 0,
        last_updated_ms: Utc::now().timestamp_millis(),
        last_column_id,
        current_schema_id: 0,
        schemas: vec![schema],
        current_snapshot_id: None,
        snapshots: Vec::new(),
        snapshot_log: Vec::new(),
        metadata_log: Vec::new(),
        properties,
        default_spec_id: 0,
        partition_specs: vec![PartitionSpec {
            spec_id: 0,
            fields: partition_fields,
        }],
        last_partition_id,
        refs: HashMap::new(),
        default_sort_order_id: sort_order.order_id,
        sort_orders: vec![sort_order],
    })
}

/// Empty metadata that a create transaction builds on.
///
/// Staged creates commit `assign-uuid`, `add-schema`, `set-location` and
/// friends against this base.
#[must_use]
pub fn empty_metadata() -> TableMetadata {
    TableMetadata {
        format_version: 1,
        table_uuid: TableUuid::random(),
        location: String::new(),
        last_sequence_number: 0,
        last_updated_ms: Utc::now().timestamp_millis(),
        last_column_id: 0,
        current_schema_id: -1,
        schemas: Vec::new(),
        current_snapshot_id: None,
        snapshots: Vec::new(),
        snapshot_log: Vec::new(),
        metadata_log: Vec::new(),
        properties: HashMap::new(),
        default_spec_id: 0,
        partition_specs: Vec::new(),
        last_partition_id: PARTITION_DATA_ID_START - 1,
        refs: HashMap::new(),
        default_sort_order_id: 0,
        sort_orders: Vec::new(),
    }
}

/// Validates update requirements against current table metadata.
///
/// `base` is `None` when the table does not exist.
///
/// # Errors
///
/// Returns `IcebergError::CommitFailed` if any requirement is not met.
pub fn validate_requirements(
    base: Option<&TableMetadata>,
    requirements: &[UpdateRequirement],
) -> IcebergResult<()> {
    for requirement in requirements {
        match (requirement, base) {
            (UpdateRequirement::AssertCreate, None) => {}
            (UpdateRequirement::AssertCreate, Some(_)) => {
                return Err(IcebergError::commit_conflict(
                    "Requirement failed: table already exists",
                ));
            }
            (_, None) => {
                return Err(IcebergError::commit_conflict(
                    "Requirement failed: current table metadata is missing",
                ));
            }
            (requirement, Some(metadata)) => validate_requirement(metadata, requirement)?,
        }
    }
    Ok(())
}

fn validate_requirement(
    metadata: &TableMetadata,
    requirement: &UpdateRequirement,
) -> IcebergResult<()> {
    match requirement {
        UpdateRequirement::AssertCreate => {}
        UpdateRequirement::AssertTableUuid { uuid } => {
            if metadata.table_uuid.as_uuid() != uuid {
                return Err(IcebergError::commit_conflict(format!(
                    "Requirement failed: UUID does not match: expected {uuid} != {}",
                    metadata.table_uuid
                )));
            }
        }
        UpdateRequirement::AssertRefSnapshotId {
            ref_name,
            snapshot_id,
        } => {
            let current = metadata
                .refs
                .get(ref_name)
                .map(|r| r.snapshot_id)
                .or_else(|| {
                    (ref_name == MAIN_BRANCH)
                        .then_some(metadata.current_snapshot_id)
                        .flatten()
                });
            if current != *snapshot_id {
                return Err(IcebergError::commit_conflict(match (snapshot_id, current) {
                    (None, Some(_)) => format!("Requirement failed: ref '{ref_name}' was created concurrently"),
                    (Some(_), None) => format!("Requirement failed: ref '{ref_name}' is missing"),
                    _ => format!(
                        "Requirement failed: ref '{ref_name}' has changed: expected id {snapshot_id:?} != {current:?}"
                    ),
                }));
            }
        }
        UpdateRequirement::AssertLastAssignedFieldId {
            last_assigned_field_id,
        } => {
            if metadata.last_column_id != *last_assigned_field_id {
                return Err(IcebergError::commit_conflict(format!(
                    "Requirement failed: last assigned field id changed: expected id {last_assigned_field_id} != {}",
                    metadata.last_column_id
                )));
            }
        }
        UpdateRequirement::AssertCurrentSchemaId { current_schema_id } => {
            if metadata.current_schema_id != *current_schema_id {
                return Err(IcebergError::commit_conflict(format!(
                    "Requirement failed: current schema changed: expected id {current_schema_id} != {}",
                    metadata.current_schema_id
                )));
            }
        }
        UpdateRequirement::AssertLastAssignedPartitionId {
            last_assigned_partition_id,
        } => {
            if metadata.last_partition_id != *last_assigned_partition_id {
                return Err(IcebergError::commit_conflict(format!(
                    "Requirement failed: last assigned partition id changed: expected id {last_assigned_partition_id} != {}",
                    metadata.last_partition_id
                )));
            }
        }
        UpdateRequirement::AssertDefaultSpecId { default_spec_id } => {
            if metadata.default_spec_id != *default_spec_id {
                return Err(IcebergError::commit_conflict(format!(
                    "Requirement failed: default partition spec changed: expected id {default_spec_id} != {}",
                    metadata.default_spec_id
                )));
            }
        }
        UpdateRequirement::AssertDefaultSortOrderId {
            default_sort_order_id,
        } => {
            if metadata.default_sort_order_id != *default_sort_order_id {
                return Err(IcebergError::commit_conflict(format!(
                    "Requirement failed: default sort order id changed: expected id {default_sort_order_id} != {}",
                    metadata.default_sort_order_id
                )));
            }
        }
    }
    Ok(())
}

/// IDs added earlier in the same commit, resolved when an update passes `-1`.
#[derive(Debug, Default)]
struct LastAdded {
    schema_id: Option<i32>,
    spec_id: Option<i32>,
    sort_order_id: Option<i32>,
}

fn id_overflow(what: &str) -> IcebergError {
    IcebergError::bad_request(format!("Cannot assign a new {what} id: ids are exhausted"))
}

/// One past the highest id in use, or `first` when none are.
fn next_id(ids: impl Iterator<Item = i32>, first: i32, what: &str) -> IcebergResult<i32> {
    match ids.max() {
        None => Ok(first),
        Some(max) => max.checked_add(1).ok_or_else(|| id_overflow(what)),
    }
}

fn resolve_last_added(requested: i32, last: Option<i32>, what: &str) -> IcebergResult<i32> {
    if requested != -1 {
        return Ok(requested);
    }
    last.ok_or_else(|| {
        IcebergError::bad_request(format!("Cannot set last added {what}: no {what} has been added"))
    })
}

/// Applies updates in order.
///
/// # Errors
///
/// Returns `BadRequest` for an update that is invalid against the metadata.
pub fn apply_updates(metadata: &mut TableMetadata, updates: &[TableUpdate]) -> IcebergResult<()> {
    let mut last_added = LastAdded::default();
    for update in updates {
        apply_update(metadata, update, &mut last_added)?;
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn apply_update(
    metadata: &mut TableMetadata,
    update: &TableUpdate,
    last_added: &mut LastAdded,
) -> IcebergResult<()> {
    match update {
        TableUpdate::AssignUuid { uuid } => {
            metadata.table_uuid = TableUuid::new(*uuid);
        }
        TableUpdate::UpgradeFormatVersion { format_version } => {
            if *format_version > MAX_FORMAT_VERSION {
                return Err(IcebergError::bad_request(format!(
                    "Cannot upgrade table to unsupported format version: v{format_version} (supported: v{MAX_FORMAT_VERSION})"
                )));
            }
            if *format_version < metadata.format_version {
                return Err(IcebergError::bad_request(format!(
                    "Cannot downgrade v{} table to v{format_version}",
                    metadata.format_version
                )));
            }
            metadata.format_version = *format_version;
        }
        TableUpdate::AddSchema {
            schema,
            last_column_id,
        } => {
            if let Some(last_column_id) = last_column_id {
                if *last_column_id < metadata.last_column_id {
                    return Err(IcebergError::bad_request(format!(
                        "Invalid last column ID: {last_column_id} < {} (previous last column ID)",
                        metadata.last_column_id
                    )));
                }
            }
            let new_last_column_id = metadata
                .last_column_id
                .max(schema.highest_field_id())
                .max(last_column_id.unwrap_or(0));

            let schema_id = if let Some(existing) = metadata
                .schemas
                .iter()
                .find(|existing| existing.same_structure(schema))
            {
                existing.schema_id
            } else {
                let mut added = schema.clone();
                if metadata
                    .schemas
                    .iter()
                    .any(|existing| existing.schema_id == added.schema_id)
                {
                    added.schema_id = next_id(
                        metadata.schemas.iter().map(|existing| existing.schema_id),
                        0,
                        "schema",
                    )?;
                }
                let id = added.schema_id;
                metadata.schemas.push(added);
                id
            };
            metadata.last_column_id = new_last_column_id;
            last_added.schema_id = Some(schema_id);
        }
        TableUpdate::SetCurrentSchema { schema_id } => {
            let schema_id = resolve_last_added(*schema_id, last_added.schema_id, "schema")?;
            if !metadata
                .schemas
                .iter()
                .any(|schema| schema.schema_id == schema_id)
            {
                return Err(IcebergError::bad_request(format!(
                    "Cannot set current schema to unknown schema: {schema_id}"
                )));
            }
            metadata.current_schema_id = schema_id;
        }
        TableUpdate::AddPartitionSpec { spec } => {
            let spec_id = if let Some(existing) = metadata
                .partition_specs
                .iter()
                .find(|existing| existing.fields == spec.fields)
            {
                existing.spec_id
            } else {
                let mut added = spec.clone();
                if metadata
                    .partition_specs
                    .iter()
                    .any(|existing| existing.spec_id == added.spec_id)
                {
                    added.spec_id = next_id(
                        metadata.partition_specs.iter().map(|existing| existing.spec_id),
                        0,
                        "partition spec",
                    )?;
                }
                if let Some(max_field_id) = added.fields.iter().map(|f| f.field_id).max() {
                    metadata.last_partition_id = metadata.last_partition_id.max(max_field_id);
                }
                let id = added.spec_id;
                metadata.partition_specs.push(added);
                id
            };
            last_added.spec_id = Some(spec_id);
        }
        TableUpdate::SetDefaultSpec { spec_id } => {
            let spec_id = resolve_last_added(*spec_id, last_added.spec_id, "partition spec")?;
            if !metadata
                .partition_specs
                .iter()
                .any(|spec| spec.spec_id == spec_id)
            {
                return Err(IcebergError::bad_request(format!(
                    "Cannot set default partition spec to unknown spec: {spec_id}"
                )));
            }
            metadata.default_spec_id = spec_id;
        }
        TableUpdate::AddSortOrder { sort_order } => {
            let order_id = if sort_order.fields.is_empty() {
                if !metadata.sort_orders.iter().any(|o| o.order_id == 0) {
                    metadata.sort_orders.push(SortOrder::unsorted());
                }
                0
            } else if let Some(existing) = metadata
                .sort_orders
                .iter()
                .find(|existing| existing.fields == sort_order.fields)
            {
                existing.order_id
            } else {
                let mut added = sort_order.clone();
                if added.order_id == 0
                    || metadata
                        .sort_orders
                        .iter()
                        .any(|existing| existing.order_id == added.order_id)
                {
                    added.order_id = next_id(
                        metadata.sort_orders.iter().map(|existing| existing.order_id),
                        1,
                        "sort order",
                    )?;
                }
                let id = added.order_id;
                metadata.sort_orders.push(added);
                id
            };
            last_added.sort_order_id = Some(order_id);
        }
        TableUpdate::SetDefaultSortOrder { sort_order_id } => {
            let order_id =
                resolve_last_added(*sort_order_id, last_added.sort_order_id, "sort order")?;
            if !metadata
                .sort_orders
                .iter()
                .any(|order| order.order_id == order_id)
            {
                return Err(IcebergError::bad_request(format!(
                    "Cannot set default sort order to unknown order: {order_id}"
                )));
            }
            metadata.default_sort_order_id = order_id;
        }
        TableUpdate::AddSnapshot { snapshot } => {
            if metadata.snapshot(snapshot.snapshot_id).is_some() {
                return Err(IcebergError::bad_request(format!(
                    "Snapshot already exists for id: {}",
                    snapshot.snapshot_id
                )));
            }
            if metadata.format_version > 1
                && !metadata.snapshots.is_empty()
                && snapshot.sequence_number <= metadata.last_sequence_number
                && snapshot.parent_snapshot_id.is_some()
            {
                return Err(IcebergError::bad_request(format!(
                    "Cannot add snapshot with sequence number {} older than last sequence number {}",
                    snapshot.sequence_number, metadata.last_sequence_number
                )));
            }
            metadata.last_sequence_number =
                metadata.last_sequence_number.max(snapshot.sequence_number);
            metadata.snapshots.push(snapshot.clone());
        }
        TableUpdate::SetSnapshotRef {
            ref_name,
            ref_type,
            snapshot_id,
            max_ref_age_ms,
            max_snapshot_age_ms,
            min_snapshots_to_keep,
        } => {
            let Some(snapshot) = metadata.snapshot(*snapshot_id) else {
                return Err(IcebergError::bad_request(format!(
                    "Cannot set {ref_name} to unknown snapshot: {snapshot_id}"
                )));
            };
            let timestamp_ms = snapshot.timestamp_ms;
            metadata.refs.insert(
                ref_name.clone(),
                SnapshotRefMetadata {
                    snapshot_id: *snapshot_id,
                    ref_type: *ref_type,
                    max_ref_age_ms: *max_ref_age_ms,
                    max_snapshot_age_ms: *max_snapshot_age_ms,
                    min_snapshots_to_keep: *min_snapshots_to_keep,
                },
            );
            if ref_name == MAIN_BRANCH && metadata.current_snapshot_id != Some(*snapshot_id) {
                metadata.current_snapshot_id = Some(*snapshot_id);
                metadata.snapshot_log.push(SnapshotLogEntry {
                    snapshot_id: *snapshot_id,
                    timestamp_ms,
                });
            }
        }
        TableUpdate::RemoveSnapshotRef { ref_name } => {
            metadata.refs.remove(ref_name);
            if ref_name == MAIN_BRANCH {
                metadata.current_snapshot_id = None;
            }
        }
        TableUpdate::RemoveSnapshots { snapshot_ids } => {
            let ids: HashSet<i64> = snapshot_ids.iter().copied().collect();
            metadata
                .snapshots
                .retain(|snap| !ids.contains(&snap.snapshot_id));
            metadata
                .snapshot_log
                .retain(|entry| !ids.contains(&entry.snapshot_id));
            metadata.refs.retain(|_, r| !ids.contains(&r.snapshot_id));
            if metadata
                .current_snapshot_id
                .is_some_and(|id| ids.contains(&id))
            {
                metadata.current_snapshot_id = None;
            }
        }
        TableUpdate::SetLocation { location } => {
            let location = location.trim_end_matches('/');
            if location.is_empty() {
                return Err(IcebergError::bad_request("Table location cannot be empty"));
            }
            metadata.location = location.to_string();
        }
        TableUpdate::SetProperties { updates } => {
            for (key, value) in updates {
                metadata.properties.insert(key.clone(), value.clone());
            }
        }
        TableUpdate::RemoveProperties { removals } => {
            for key in removals {
                metadata.properties.remove(key);
            }
        }
    }

    Ok(())
}

/// Checks that metadata built by a create transaction is usable.
///
/// # Errors
///
/// Returns `BadRequest` when the location or current schema is missing.
pub fn validate_created_metadata(metadata: &TableMetadata) -> IcebergResult<()> {
    if metadata.location.is_empty() {
        return Err(IcebergError::bad_request(
            "Cannot create table without a location",
        ));
    }
    if metadata.current_schema().is_none() {
        return Err(IcebergError::bad_request(
            "Cannot create table without a current schema",
        ));
    }
    Ok(())
}

/// Finishes metadata before it is written.
///
/// Appends the previous metadata file to the metadata log, trims the log to
/// `write.metadata.previous-versions-max` and stamps `last-updated-ms`.
pub fn finalize_metadata(
    metadata: &mut TableMetadata,
    base: Option<&TableMetadata>,
    previous_location: Option<&str>,
) {
    if let (Some(base), Some(previous)) = (base, previous_location) {
        if metadata
            .metadata_log
            .last()
            .is_none_or(|entry| entry.metadata_file != previous)
        {
            metadata.metadata_log.push(MetadataLogEntry {
                metadata_file: previous.to_string(),
                timestamp_ms: base.last_updated_ms,
            });
        }
    }

    let max_entries = metadata
        .properties
        .get(PREVIOUS_VERSIONS_MAX_PROPERTY)
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_PREVIOUS_VERSIONS_MAX)
        .max(1);
    if metadata.metadata_log.len() > max_entries {
        let excess = metadata.metadata_log.len() - max_entries;
        metadata.metadata_log.drain(..excess);
    }

    metadata.last_updated_ms = Utc::now()
        .timestamp_millis()
        .max(base.map_or(0, |b| b.last_updated_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Schema, SchemaField, Snapshot, SnapshotRefType, SortField, UnboundPartitionField,
        UnboundPartitionSpec,
    };
    use uuid::Uuid;

    const TABLE_UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn schema(id: i32, fields: &[(i32, &str)]) -> Schema {
        Schema {
            schema_id: id,
            schema_type: "struct".to_string(),
            fields: fields
                .iter()
                .map(|(field_id, name)| SchemaField {
                    id: *field_id,
                    name: (*name).to_string(),
                    required: false,
                    field_type: serde_json::json!("long"),
                    doc: None,
                })
                .collect(),
            identifier_field_ids: None,
        }
    }

    fn snapshot(id: i64, sequence_number: i64) -> Snapshot {
        Snapshot {
            snapshot_id: id,
            parent_snapshot_id: None,
            sequence_number,
            timestamp_ms: 1_700_000_000_000 + id,
            manifest_list: format!("file:///w/t/metadata/snap-{id}.avro"),
            summary: HashMap::new(),
            schema_id: Some(0),
        }
    }

    fn test_metadata() -> TableMetadata {
        TableMetadata {
            format_version: 2,
            table_uuid: TableUuid::new(Uuid::parse_str(TABLE_UUID).expect("valid uuid")),
            location: "file:///warehouse/db/events".to_string(),
            last_sequence_number: 5,
            last_updated_ms: 1_234_567_890_000,
            last_column_id: 10,
            current_schema_id: 0,
            schemas: vec![schema(0, &[(1, "id"), (10, "ts")])],
            current_snapshot_id: Some(100),
            snapshots: vec![snapshot(100, 5)],
            snapshot_log: vec![],
            metadata_log: vec![],
            properties: HashMap::new(),
            default_spec_id: 0,
            partition_specs: vec![PartitionSpec {
                spec_id: 0,
                fields: vec![],
            }],
            last_partition_id: 999,
            refs: HashMap::from([(
                "main".to_string(),
                SnapshotRefMetadata {
                    snapshot_id: 100,
                    ref_type: SnapshotRefType::Branch,
                    max_ref_age_ms: None,
                    max_snapshot_age_ms: None,
                    min_snapshots_to_keep: None,
                },
            )]),
            default_sort_order_id: 0,
            sort_orders: vec![SortOrder::unsorted()],
        }
    }

    fn create_request() -> CreateTableRequest {
        CreateTableRequest {
            name: "events".to_string(),
            location: None,
            schema: schema(7, &[(1, "id"), (2, "ts")]),
            partition_spec: None,
            write_order: None,
            stage_create: false,
            properties: HashMap::new(),
        }
    }

    #[test]
    fn test_default_table_location() {
        let ident = TableIdent::new(vec!["a".into(), "b".into()], "t");
        assert_eq!(
            default_table_location("file:///warehouse/", &ident),
            "file:///warehouse/a/b/t"
        );
    }

    #[test]
    fn test_metadata_version_parsing() {
        assert_eq!(
            parse_metadata_version(&format!("file:///w/t/metadata/00007-{TABLE_UUID}.metadata.json")),
            Some(7)
        );
        assert_eq!(
            parse_metadata_version("file:///w/t/metadata/v3.metadata.json"),
            Some(3)
        );
        assert_eq!(parse_metadata_version("file:///w/t/metadata/custom.json"), None);

        let metadata = test_metadata();
        let next = next_metadata_location(
            &metadata,
            Some("file:///warehouse/db/events/metadata/00004-abc.metadata.json"),
        );
        assert!(next.starts_with("file:///warehouse/db/events/metadata/00005-"));
        assert!(next_metadata_location(&metadata, None).contains("/metadata/00000-"));
    }

    #[test]
    fn test_new_table_metadata_defaults() {
        let metadata = new_table_metadata(&create_request(), "file:///w/db/events/").expect("new");
        assert_eq!(metadata.format_version, 2);
        assert_eq!(metadata.location, "file:///w/db/events");
        assert_eq!(metadata.current_schema_id, 0);
        assert_eq!(metadata.schemas[0].schema_id, 0);
        assert_eq!(metadata.last_column_id, 2);
        assert_eq!(metadata.last_partition_id, 999);
        assert_eq!(metadata.default_sort_order_id, 0);
        assert_eq!(metadata.current_snapshot_id, None);
    }

    #[test]
    fn test_new_table_metadata_consumes_format_version() {
        let mut request = create_request();
        request
            .properties
            .insert(FORMAT_VERSION_PROPERTY.to_string(), "1".to_string());
        request
            .properties
            .insert("owner".to_string(), "ops".to_string());
        let metadata = new_table_metadata(&request, "file:///w/t").expect("new");
        assert_eq!(metadata.format_version, 1);
        assert!(!metadata.properties.contains_key(FORMAT_VERSION_PROPERTY));
        assert_eq!(metadata.properties.get("owner").map(String::as_str), Some("ops"));

        request
            .properties
            .insert(FORMAT_VERSION_PROPERTY.to_string(), "3".to_string());
        let err = new_table_metadata(&request, "file:///w/t").expect_err("v3");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_new_table_metadata_assigns_partition_and_sort_ids() {
        let mut request = create_request();
        request.partition_spec = Some(UnboundPartitionSpec {
            spec_id: None,
            fields: vec![
                UnboundPartitionField {
                    source_id: 2,
                    field_id: None,
                    name: "ts_day".to_string(),
                    transform: "day".to_string(),
                },
                UnboundPartitionField {
                    source_id: 1,
                    field_id: None,
                    name: "id_bucket".to_string(),
                    transform: "bucket[16]".to_string(),
                },
            ],
        });
        request.write_order = Some(SortOrder {
            order_id: 0,
            fields: vec![SortField {
                source_id: 1,
                transform: "identity".to_string(),
                direction: "asc".to_string(),
                null_order: "nulls-first".to_string(),
            }],
        });

        let metadata = new_table_metadata(&request, "file:///w/t").expect("new");
        let ids: Vec<i32> = metadata.partition_specs[0]
            .fields
            .iter()
            .map(|f| f.field_id)
            .collect();
        assert_eq!(ids, vec![1000, 1001]);
        assert_eq!(metadata.last_partition_id, 1001);
        assert_eq!(metadata.default_sort_order_id, 1);
        assert_eq!(metadata.sort_orders[0].order_id, 1);
    }

    #[test]
    fn test_new_table_metadata_partition_id_at_i32_max() {
        let field = |field_id, name: &str| UnboundPartitionField {
            source_id: 1,
            field_id,
            name: name.to_string(),
            transform: "identity".to_string(),
        };
        let mut request = create_request();
        request.partition_spec = Some(UnboundPartitionSpec {
            spec_id: None,
            fields: vec![field(Some(i32::MAX), "id_max")],
        });
        let metadata = new_table_metadata(&request, "file:///w/t").expect("new");
        assert_eq!(metadata.last_partition_id, i32::MAX);

        request.partition_spec = Some(UnboundPartitionSpec {
            spec_id: None,
            fields: vec![field(Some(i32::MAX), "id_max"), field(None, "next")],
        });
        let err = new_table_metadata(&request, "file:///w/t").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_add_schema_id_exhausted() {
        let mut metadata = test_metadata();
        apply_updates(
            &mut metadata,
            &[TableUpdate::AddSchema {
                schema: schema(i32::MAX, &[(1, "id"), (10, "ts"), (11, "value")]),
                last_column_id: None,
            }],
        )
        .expect("apply");

        let err = apply_updates(
            &mut metadata,
            &[TableUpdate::AddSchema {
                schema: schema(0, &[(1, "id"), (12, "other")]),
                last_column_id: None,
            }],
        )
        .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_validate_table_uuid() {
        let metadata = test_metadata();
        let ok = vec![UpdateRequirement::AssertTableUuid {
            uuid: Uuid::parse_str(TABLE_UUID).expect("valid uuid"),
        }];
        assert!(validate_requirements(Some(&metadata), &ok).is_ok());

        let bad = vec![UpdateRequirement::AssertTableUuid {
            uuid: Uuid::new_v4(),
        }];
        let err = validate_requirements(Some(&metadata), &bad).expect_err("mismatch");
        assert_eq!(err.error_type(), "CommitFailedException");
    }

    #[test]
    fn test_validate_ref_snapshot_id() {
        let metadata = test_metadata();
        let main = |id| {
            vec![UpdateRequirement::AssertRefSnapshotId {
                ref_name: "main".to_string(),
                snapshot_id: id,
            }]
        };
        assert!(validate_requirements(Some(&metadata), &main(Some(100))).is_ok());
        assert!(validate_requirements(Some(&metadata), &main(Some(999))).is_err());
        assert!(validate_requirements(Some(&metadata), &main(None)).is_err());

        let missing = vec![UpdateRequirement::AssertRefSnapshotId {
            ref_name: "audit".to_string(),
            snapshot_id: None,
        }];
        assert!(validate_requirements(Some(&metadata), &missing).is_ok());
    }

    #[test]
    fn test_validate_ref_falls_back_to_current_snapshot() {
        let mut metadata = test_metadata();
        metadata.refs.clear();
        let requirements = vec![UpdateRequirement::AssertRefSnapshotId {
            ref_name: "main".to_string(),
            snapshot_id: Some(100),
        }];
        assert!(validate_requirements(Some(&metadata), &requirements).is_ok());
    }

    #[test]
    fn test_validate_id_requirements() {
        let metadata = test_metadata();
        let passing = vec![
            UpdateRequirement::AssertCurrentSchemaId {
                current_schema_id: 0,
            },
            UpdateRequirement::AssertLastAssignedFieldId {
                last_assigned_field_id: 10,
            },
            UpdateRequirement::AssertLastAssignedPartitionId {
                last_assigned_partition_id: 999,
            },
            UpdateRequirement::AssertDefaultSpecId { default_spec_id: 0 },
            UpdateRequirement::AssertDefaultSortOrderId {
                default_sort_order_id: 0,
            },
        ];
        assert!(validate_requirements(Some(&metadata), &passing).is_ok());

        let failing = vec![
            UpdateRequirement::AssertCurrentSchemaId {
                current_schema_id: 0,
            },
            UpdateRequirement::AssertCurrentSchemaId {
                current_schema_id: 5,
            },
        ];
        assert!(validate_requirements(Some(&metadata), &failing).is_err());
    }

    #[test]
    fn test_validate_assert_create() {
        let metadata = test_metadata();
        let create = vec![UpdateRequirement::AssertCreate];
        assert!(validate_requirements(None, &create).is_ok());
        assert!(validate_requirements(Some(&metadata), &create).is_err());

        let uuid = vec![UpdateRequirement::AssertTableUuid {
            uuid: Uuid::new_v4(),
        }];
        assert!(validate_requirements(None, &uuid).is_err());
    }

    #[test]
    fn test_staged_create_updates_from_empty_base() {
        let mut metadata = empty_metadata();
        let uuid = Uuid::new_v4();
        apply_updates(
            &mut metadata,
            &[
                TableUpdate::AssignUuid { uuid },
                TableUpdate::UpgradeFormatVersion { format_version: 2 },
                TableUpdate::AddSchema {
                    schema: schema(0, &[(1, "id"), (2, "name")]),
                    last_column_id: Some(2),
                },
                TableUpdate::SetCurrentSchema { schema_id: -1 },
                TableUpdate::AddPartitionSpec {
                    spec: PartitionSpec {
                        spec_id: 0,
                        fields: vec![],
                    },
                },
                TableUpdate::SetDefaultSpec { spec_id: -1 },
                TableUpdate::AddSortOrder {
                    sort_order: SortOrder::unsorted(),
                },
                TableUpdate::SetDefaultSortOrder { sort_order_id: -1 },
                TableUpdate::SetLocation {
                    location: "file:///w/db/staged/".to_string(),
                },
                TableUpdate::SetProperties {
                    updates: HashMap::from([("owner".to_string(), "ops".to_string())]),
                },
            ],
        )
        .expect("apply");

        assert_eq!(metadata.table_uuid.as_uuid(), &uuid);
        assert_eq!(metadata.format_version, 2);
        assert_eq!(metadata.current_schema_id, 0);
        assert_eq!(metadata.last_column_id, 2);
        assert_eq!(metadata.location, "file:///w/db/staged");
        assert!(validate_created_metadata(&metadata).is_ok());
        assert!(validate_created_metadata(&empty_metadata()).is_err());
    }

    #[test]
    fn test_add_schema_reassigns_colliding_id() {
        let mut metadata = test_metadata();
        apply_updates(
            &mut metadata,
            &[
                TableUpdate::AddSchema {
                    schema: schema(0, &[(1, "id"), (10, "ts"), (11, "value")]),
                    last_column_id: None,
                },
                TableUpdate::SetCurrentSchema { schema_id: -1 },
            ],
        )
        .expect("apply");
        assert_eq!(metadata.schemas.len(), 2);
        assert_eq!(metadata.current_schema_id, 1);
        assert_eq!(metadata.last_column_id, 11);
    }

    #[test]
    fn test_add_schema_reuses_identical_schema() {
        let mut metadata = test_metadata();
        apply_updates(
            &mut metadata,
            &[TableUpdate::AddSchema {
                schema: schema(4, &[(1, "id"), (10, "ts")]),
                last_column_id: None,
            }],
        )
        .expect("apply");
        assert_eq!(metadata.schemas.len(), 1);
    }

    #[test]
    fn test_add_schema_rejects_backwards_last_column_id() {
        let mut metadata = test_metadata();
        let err = apply_updates(
            &mut metadata,
            &[TableUpdate::AddSchema {
                schema: schema(1, &[(1, "id")]),
                last_column_id: Some(3),
            }],
        )
        .expect_err("backwards");
        assert_eq!(err.error_type(), "BadRequestException");
    }

    #[test]
    fn test_set_current_schema_last_added_without_add() {
        let mut metadata = test_metadata();
        let err = apply_updates(&mut metadata, &[TableUpdate::SetCurrentSchema { schema_id: -1 }])
            .expect_err("nothing added");
        assert_eq!(err.error_type(), "BadRequestException");
    }

    #[test]
    fn test_format_version_bounds() {
        let mut metadata = test_metadata();
        assert!(
            apply_updates(
                &mut metadata,
                &[TableUpdate::UpgradeFormatVersion { format_version: 1 }]
            )
            .is_err()
        );
        assert!(
            apply_updates(
                &mut metadata,
                &[TableUpdate::UpgradeFormatVersion { format_version: 3 }]
            )
            .is_err()
        );
    }

    #[test]
    fn test_snapshot_and_main_ref() {
        let mut metadata = test_metadata();
        apply_updates(
            &mut metadata,
            &[
                TableUpdate::AddSnapshot {
                    snapshot: snapshot(101, 6),
                },
                TableUpdate::SetSnapshotRef {
                    ref_name: "main".to_string(),
                    ref_type: SnapshotRefType::Branch,
                    snapshot_id: 101,
                    max_ref_age_ms: None,
                    max_snapshot_age_ms: None,
                    min_snapshots_to_keep: None,
                },
            ],
        )
        .expect("apply");
        assert_eq!(metadata.current_snapshot_id, Some(101));
        assert_eq!(metadata.last_sequence_number, 6);
        assert_eq!(metadata.snapshot_log.len(), 1);
        assert_eq!(metadata.snapshot_log[0].timestamp_ms, 1_700_000_000_101);

        let err = apply_updates(
            &mut metadata,
            &[TableUpdate::AddSnapshot {
                snapshot: snapshot(101, 7),
            }],
        )
        .expect_err("duplicate");
        assert!(err.message().contains("101"));
    }

    #[test]
    fn test_set_ref_to_unknown_snapshot() {
        let mut metadata = test_metadata();
        let err = apply_updates(
            &mut metadata,
            &[TableUpdate::SetSnapshotRef {
                ref_name: "audit".to_string(),
                ref_type: SnapshotRefType::Tag,
                snapshot_id: 555,
                max_ref_age_ms: None,
                max_snapshot_age_ms: None,
                min_snapshots_to_keep: None,
            }],
        )
        .expect_err("unknown");
        assert_eq!(err.error_type(), "BadRequestException");
    }

    #[test]
    fn test_remove_snapshots_clears_refs() {
        let mut metadata = test_metadata();
        apply_updates(
            &mut metadata,
            &[TableUpdate::RemoveSnapshots {
                snapshot_ids: vec![100],
            }],
        )
        .expect("apply");
        assert!(metadata.snapshots.is_empty());
        assert!(metadata.refs.is_empty());
        assert_eq!(metadata.current_snapshot_id, None);
    }

    #[test]
    fn test_properties_updates() {
        let mut metadata = test_metadata();
        metadata
            .properties
            .insert("stale".to_string(), "x".to_string());
        apply_updates(
            &mut metadata,
            &[
                TableUpdate::SetProperties {
                    updates: HashMap::from([("owner".to_string(), "ops".to_string())]),
                },
                TableUpdate::RemoveProperties {
                    removals: vec!["stale".to_string(), "never-set".to_string()],
                },
            ],
        )
        .expect("apply");
        assert_eq!(metadata.properties.len(), 1);
        assert_eq!(metadata.properties.get("owner").map(String::as_str), Some("ops"));
    }

    #[test]
    fn test_finalize_appends_and_trims_metadata_log() {
        let base = test_metadata();
        let mut metadata = base.clone();
        metadata
            .properties
            .insert(PREVIOUS_VERSIONS_MAX_PROPERTY.to_string(), "2".to_string());
        metadata.metadata_log = vec![
            MetadataLogEntry {
                metadata_file: "file:///m/00000-a.metadata.json".to_string(),
                timestamp_ms: 1,
            },
            MetadataLogEntry {
                metadata_file: "file:///m/00001-b.metadata.json".to_string(),
                timestamp_ms: 2,
            },
        ];

        finalize_metadata(
            &mut metadata,
            Some(&base),
            Some("file:///m/00002-c.metadata.json"),
        );

        let files: Vec<&str> = metadata
            .metadata_log
            .iter()
            .map(|entry| entry.metadata_file.as_str())
            .collect();
        assert_eq!(
            files,
            vec![
                "file:///m/00001-b.metadata.json",
                "file:///m/00002-c.metadata.json"
            ]
        );
        assert_eq!(metadata.metadata_log[1].timestamp_ms, base.last_updated_ms);
        assert!(metadata.last_updated_ms >= base.last_updated_ms);
    }
}
