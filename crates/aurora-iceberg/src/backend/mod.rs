//! Catalog backends: where namespaces and table pointers live.
//!
//! A backend stores namespaces with their properties and, for each table, the
//! location of its current metadata file. Table metadata itself is written
//! through [`crate::io::FileIo`]; the backend only swaps pointers.

mod memory;
mod sqlite;

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{NamespaceIdent, TableIdent, namespace_display};

pub use memory::MemoryBackend;
pub use sqlite::{SqliteBackend, SqliteLocation};

/// Result alias for backend operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised by catalog backends and file IO.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The namespace does not exist.
    #[error("Namespace does not exist: {0}")]
    NoSuchNamespace(String),

    /// The table does not exist.
    #[error("Table does not exist: {0}")]
    NoSuchTable(String),

    /// The namespace or table already exists.
    #[error("{entity} already exists: {name}")]
    AlreadyExists {
        /// `Namespace` or `Table`.
        entity: &'static str,
        /// Display name of the entity.
        name: String,
    },

    /// The namespace still has tables or child namespaces.
    #[error("Namespace is not empty: {0}")]
    NamespaceNotEmpty(String),

    /// A pointer swap lost a race or a requirement no longer holds.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// The request is invalid for this backend.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A metadata file does not exist.
    #[error("File does not exist: {0}")]
    FileNotFound(String),

    /// The backend cannot serve requests right now.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metadata could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Catalog record of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// Table identifier.
    pub ident: TableIdent,
    /// Current metadata file.
    pub metadata_location: String,
    /// Metadata file replaced by the last commit.
    pub previous_metadata_location: Option<String>,
}

/// A single pointer swap inside [`CatalogBackend::commit_tables`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCommit {
    /// Table to update.
    pub ident: TableIdent,
    /// Location the caller based its change on; `None` creates the table.
    pub expected_location: Option<String>,
    /// Location of the freshly written metadata file.
    pub new_location: String,
}

/// Outcome of a namespace property update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertiesUpdate {
    /// Keys that were set.
    pub updated: Vec<String>,
    /// Keys that were removed.
    pub removed: Vec<String>,
    /// Removal keys that were not present.
    pub missing: Vec<String>,
}

/// Storage for namespaces and table pointers.
#[async_trait]
pub trait CatalogBackend: Send + Sync + 'static {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Creates a namespace.
    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
    ) -> CatalogResult<()>;

    /// Lists top-level namespaces, or the direct children of `parent`.
    async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
    ) -> CatalogResult<Vec<NamespaceIdent>>;

    /// Loads namespace properties.
    async fn load_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> CatalogResult<HashMap<String, String>>;

    /// Returns true if the namespace exists.
    async fn namespace_exists(&self, namespace: &NamespaceIdent) -> CatalogResult<bool>;

    /// Drops an empty namespace.
    async fn drop_namespace(&self, namespace: &NamespaceIdent) -> CatalogResult<()>;

    /// Removes and sets namespace properties.
    async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> CatalogResult<PropertiesUpdate>;

    /// Lists tables in a namespace, sorted by name.
    async fn list_tables(&self, namespace: &NamespaceIdent) -> CatalogResult<Vec<TableIdent>>;

    /// Loads a table entry.
    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Option<TableEntry>>;

    /// Registers a new table pointing at `metadata_location`.
    async fn create_table(&self, ident: &TableIdent, metadata_location: &str) -> CatalogResult<()>;

    /// Removes a table and returns its last entry.
    async fn drop_table(&self, ident: &TableIdent) -> CatalogResult<TableEntry>;

    /// Renames a table, possibly across namespaces.
    async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> CatalogResult<()>;

    /// Atomically swaps the metadata pointers of one or more tables.
    ///
    /// Either every commit applies or none does.
    async fn commit_tables(&self, commits: &[TableCommit]) -> CatalogResult<()>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> CatalogResult<()> {
        Ok(())
    }

    /// Releases backend resources.
    async fn close(&self) -> CatalogResult<()> {
        Ok(())
    }
}

/// Supported values of the `catalog-backend` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogBackendKind {
    /// Hive metastore (recognized, not supported).
    Hive,
    /// JDBC catalog schema, served from SQLite.
    Jdbc,
    /// Process-local, non-durable.
    Memory,
}

impl CatalogBackendKind {
    /// Returns the configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hive => "hive",
            Self::Jdbc => "jdbc",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for CatalogBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hive" => Ok(Self::Hive),
            "jdbc" => Ok(Self::Jdbc),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown catalog backend '{other}' (expected memory, jdbc or hive)"
            )),
        }
    }
}

/// Projects a set of namespaces onto the level below `parent`.
///
/// With no parent this yields the distinct first levels, so a namespace
/// `a.b` makes `a` visible even if `a` was never created on its own.
pub(crate) fn child_namespaces<'a>(
    all: impl Iterator<Item = &'a NamespaceIdent>,
    parent: Option<&NamespaceIdent>,
) -> Vec<NamespaceIdent> {
    let depth = parent.map_or(0, Vec::len);
    let children: BTreeSet<NamespaceIdent> = all
        .filter(|ns| ns.len() > depth)
        .filter(|ns| parent.is_none_or(|p| ns.starts_with(p)))
        .map(|ns| ns[..=depth].to_vec())
        .collect();
    children.into_iter().collect()
}

/// Returns true if `candidate` is nested strictly below `namespace`.
pub(crate) fn is_descendant(candidate: &NamespaceIdent, namespace: &NamespaceIdent) -> bool {
    candidate.len() > namespace.len() && candidate.starts_with(namespace)
}

/// Computes the outcome of a property update against current properties.
pub(crate) fn apply_property_changes(
    properties: &mut HashMap<String, String>,
    removals: &[String],
    updates: &HashMap<String, String>,
) -> PropertiesUpdate {
    let mut result = PropertiesUpdate::default();
    for key in removals {
        if properties.remove(key).is_some() {
            result.removed.push(key.clone());
        } else {
            result.missing.push(key.clone());
        }
    }
    for (key, value) in updates {
        properties.insert(key.clone(), value.clone());
        result.updated.push(key.clone());
    }
    result.updated.sort();
    result.removed.sort();
    result.missing.sort();
    result
}

pub(crate) fn namespace_name(namespace: &NamespaceIdent) -> String {
    namespace_display(namespace)
}
