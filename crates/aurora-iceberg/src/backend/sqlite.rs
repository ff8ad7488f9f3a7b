//! SQLite backend using the Iceberg JDBC catalog schema.
//!
//! Tables and namespace properties live in `iceberg_tables` and
//! `iceberg_namespace_properties`, keyed by catalog name, so a database
//! written here can be opened by an Iceberg `JdbcCatalog` pointed at the
//! same file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{
    CatalogBackend, CatalogError, CatalogResult, PropertiesUpdate, TableCommit, TableEntry,
    apply_property_changes, child_namespaces, is_descendant, namespace_name,
};
use crate::types::{NamespaceIdent, TableIdent};

/// Catalog name recorded in every row.
pub const CATALOG_NAME: &str = "aurora";

/// Marker property written for every namespace; hidden from clients.
const NAMESPACE_EXISTS_PROPERTY: &str = "exists";

const CREATE_SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS iceberg_tables (
    catalog_name VARCHAR(255) NOT NULL,
    table_namespace VARCHAR(255) NOT NULL,
    table_name VARCHAR(255) NOT NULL,
    metadata_location VARCHAR(1000),
    previous_metadata_location VARCHAR(1000),
    PRIMARY KEY (catalog_name, table_namespace, table_name)
);
CREATE TABLE IF NOT EXISTS iceberg_namespace_properties (
    catalog_name VARCHAR(255) NOT NULL,
    namespace VARCHAR(255) NOT NULL,
    property_key VARCHAR(255),
    property_value VARCHAR(1000),
    PRIMARY KEY (catalog_name, namespace, property_key)
);
";

/// Where the SQLite database lives, parsed from a JDBC URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    /// Private in-memory database.
    Memory,
    /// Database file.
    File(PathBuf),
}

impl SqliteLocation {
    /// Parses `jdbc:sqlite:<path>`, `jdbc:sqlite:file:<path>` or
    /// `jdbc:sqlite::memory:`. Query parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation error for non-SQLite URIs or an empty path.
    pub fn parse(uri: &str) -> CatalogResult<Self> {
        let rest = uri.trim().strip_prefix("jdbc:sqlite:").ok_or_else(|| {
            CatalogError::Validation(format!(
                "Unsupported JDBC URI '{uri}': only jdbc:sqlite: is supported"
            ))
        })?;
        let rest = rest.split('?').next().unwrap_or_default();
        let rest = rest.strip_prefix("file:").unwrap_or(rest);
        if rest == ":memory:" {
            return Ok(Self::Memory);
        }
        let path = rest.strip_prefix("//").unwrap_or(rest);
        if path.is_empty() {
            return Err(CatalogError::Validation(format!(
                "JDBC URI '{uri}' does not name a database file"
            )));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

/// Catalog backend stored in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens the database at `uri`. When `initialize` is set the catalog
    /// tables are created if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid or the database cannot be opened.
    pub fn open(uri: &str, initialize: bool) -> CatalogResult<Self> {
        let conn = match SqliteLocation::parse(uri)? {
            SqliteLocation::Memory => Connection::open_in_memory()?,
            SqliteLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CatalogError::Storage(format!(
                            "failed to create directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                Connection::open(&path)?
            }
        };
        if initialize {
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            tracing::info!(uri = %uri, "Initialized JDBC catalog tables");
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> CatalogResult<T>
    where
        F: FnOnce(&mut Connection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CatalogError::Storage("sqlite connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CatalogError::Storage(format!("sqlite task failed: {e}")))?
    }
}

fn encode_namespace(namespace: &NamespaceIdent) -> CatalogResult<String> {
    if let Some(level) = namespace.iter().find(|level| level.contains('.')) {
        return Err(CatalogError::Validation(format!(
            "Namespace level '{level}' contains '.', which the JDBC catalog cannot store"
        )));
    }
    Ok(namespace.join("."))
}

fn decode_namespace(encoded: &str) -> NamespaceIdent {
    encoded.split('.').map(str::to_string).collect()
}

fn namespace_exists_tx(conn: &Connection, encoded: &str) -> CatalogResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM iceberg_namespace_properties \
             WHERE catalog_name = ?1 AND namespace = ?2 LIMIT 1",
            params![CATALOG_NAME, encoded],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn all_namespaces(conn: &Connection) -> CatalogResult<Vec<NamespaceIdent>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT namespace FROM iceberg_namespace_properties WHERE catalog_name = ?1",
    )?;
    let rows = stmt.query_map(params![CATALOG_NAME], |row| row.get::<_, String>(0))?;
    let mut namespaces = Vec::new();
    for row in rows {
        namespaces.push(decode_namespace(&row?));
    }
    Ok(namespaces)
}

fn load_properties(conn: &Connection, encoded: &str) -> CatalogResult<HashMap<String, String>> {
    let mut stmt = conn.prepare(
        "SELECT property_key, property_value FROM iceberg_namespace_properties \
         WHERE catalog_name = ?1 AND namespace = ?2",
    )?;
    let rows = stmt.query_map(params![CATALOG_NAME, encoded], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    let mut properties = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        if key != NAMESPACE_EXISTS_PROPERTY {
            properties.insert(key, value.unwrap_or_default());
        }
    }
    Ok(properties)
}

fn load_entry(conn: &Connection, ident: &TableIdent) -> CatalogResult<Option<TableEntry>> {
    let encoded = encode_namespace(&ident.namespace)?;
    let row = conn
        .query_row(
            "SELECT metadata_location, previous_metadata_location FROM iceberg_tables \
             WHERE catalog_name = ?1 AND table_namespace = ?2 AND table_name = ?3",
            params![CATALOG_NAME, encoded, ident.name],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                ))
            },
        )
        .optional()?;
    Ok(row.map(|(metadata_location, previous)| TableEntry {
        ident: ident.clone(),
        metadata_location: metadata_location.unwrap_or_default(),
        previous_metadata_location: previous,
    }))
}

fn insert_table(conn: &Connection, ident: &TableIdent, location: &str) -> CatalogResult<()> {
    let encoded = encode_namespace(&ident.namespace)?;
    if !namespace_exists_tx(conn, &encoded)? {
        return Err(CatalogError::NoSuchNamespace(namespace_name(&ident.namespace)));
    }
    if load_entry(conn, ident)?.is_some() {
        return Err(CatalogError::AlreadyExists {
            entity: "Table",
            name: ident.to_string(),
        });
    }
    conn.execute(
        "INSERT INTO iceberg_tables \
         (catalog_name, table_namespace, table_name, metadata_location, previous_metadata_location) \
         VALUES (?1, ?2, ?3, ?4, NULL)",
        params![CATALOG_NAME, encoded, ident.name, location],
    )?;
    Ok(())
}

#[async_trait]
impl CatalogBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "jdbc"
    }

    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
    ) -> CatalogResult<()> {
        let encoded = encode_namespace(namespace)?;
        let display = namespace_name(namespace);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if namespace_exists_tx(&tx, &encoded)? {
                return Err(CatalogError::AlreadyExists {
                    entity: "Namespace",
                    name: display,
                });
            }
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO iceberg_namespace_properties \
                     (catalog_name, namespace, property_key, property_value) VALUES (?1, ?2, ?3, ?4)",
                )?;
                stmt.execute(params![CATALOG_NAME, encoded, NAMESPACE_EXISTS_PROPERTY, "true"])?;
                for (key, value) in &properties {
                    if key != NAMESPACE_EXISTS_PROPERTY {
                        stmt.execute(params![CATALOG_NAME, encoded, key, value])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
    ) -> CatalogResult<Vec<NamespaceIdent>> {
        let parent = parent.cloned();
        let encoded_parent = parent.as_ref().map(encode_namespace).transpose()?;
        self.with_conn(move |conn| {
            let all = all_namespaces(conn)?;
            let children = child_namespaces(all.iter(), parent.as_ref());
            if let (Some(parent), Some(encoded)) = (&parent, &encoded_parent) {
                if children.is_empty() && !namespace_exists_tx(conn, encoded)? {
                    return Err(CatalogError::NoSuchNamespace(namespace_name(parent)));
                }
            }
            Ok(children)
        })
        .await
    }

    async fn load_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> CatalogResult<HashMap<String, String>> {
        let encoded = encode_namespace(namespace)?;
        let display = namespace_name(namespace);
        self.with_conn(move |conn| {
            if !namespace_exists_tx(conn, &encoded)? {
                return Err(CatalogError::NoSuchNamespace(display));
            }
            load_properties(conn, &encoded)
        })
        .await
    }

    async fn namespace_exists(&self, namespace: &NamespaceIdent) -> CatalogResult<bool> {
        let encoded = encode_namespace(namespace)?;
        self.with_conn(move |conn| namespace_exists_tx(conn, &encoded))
            .await
    }

    async fn drop_namespace(&self, namespace: &NamespaceIdent) -> CatalogResult<()> {
        let encoded = encode_namespace(namespace)?;
        let namespace = namespace.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !namespace_exists_tx(&tx, &encoded)? {
                return Err(CatalogError::NoSuchNamespace(namespace_name(&namespace)));
            }
            let table_count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM iceberg_tables WHERE catalog_name = ?1 AND table_namespace = ?2",
                params![CATALOG_NAME, encoded],
                |row| row.get(0),
            )?;
            let has_children = all_namespaces(&tx)?
                .iter()
                .any(|candidate| is_descendant(candidate, &namespace));
            if table_count > 0 || has_children {
                return Err(CatalogError::NamespaceNotEmpty(namespace_name(&namespace)));
            }
            tx.execute(
                "DELETE FROM iceberg_namespace_properties WHERE catalog_name = ?1 AND namespace = ?2",
                params![CATALOG_NAME, encoded],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> CatalogResult<PropertiesUpdate> {
        let encoded = encode_namespace(namespace)?;
        let display = namespace_name(namespace);
        let removals = removals.to_vec();
        let updates = updates.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if !namespace_exists_tx(&tx, &encoded)? {
                return Err(CatalogError::NoSuchNamespace(display));
            }
            let mut properties = load_properties(&tx, &encoded)?;
            let result = apply_property_changes(&mut properties, &removals, &updates);
            for key in &result.removed {
                tx.execute(
                    "DELETE FROM iceberg_namespace_properties \
                     WHERE catalog_name = ?1 AND namespace = ?2 AND property_key = ?3",
                    params![CATALOG_NAME, encoded, key],
                )?;
            }
            for key in &result.updated {
                tx.execute(
                    "INSERT INTO iceberg_namespace_properties \
                     (catalog_name, namespace, property_key, property_value) VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(catalog_name, namespace, property_key) \
                     DO UPDATE SET property_value = excluded.property_value",
                    params![CATALOG_NAME, encoded, key, properties.get(key)],
                )?;
            }
            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn list_tables(&self, namespace: &NamespaceIdent) -> CatalogResult<Vec<TableIdent>> {
        let encoded = encode_namespace(namespace)?;
        let namespace = namespace.clone();
        self.with_conn(move |conn| {
            if !namespace_exists_tx(conn, &encoded)? {
                return Err(CatalogError::NoSuchNamespace(namespace_name(&namespace)));
            }
            let mut stmt = conn.prepare(
                "SELECT table_name FROM iceberg_tables \
                 WHERE catalog_name = ?1 AND table_namespace = ?2 ORDER BY table_name",
            )?;
            let rows = stmt.query_map(params![CATALOG_NAME, encoded], |row| {
                row.get::<_, String>(0)
            })?;
            let mut tables = Vec::new();
            for name in rows {
                tables.push(TableIdent::new(namespace.clone(), name?));
            }
            Ok(tables)
        })
        .await
    }

    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Option<TableEntry>> {
        let ident = ident.clone();
        self.with_conn(move |conn| load_entry(conn, &ident)).await
    }

    async fn create_table(&self, ident: &TableIdent, metadata_location: &str) -> CatalogResult<()> {
        let ident = ident.clone();
        let location = metadata_location.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            insert_table(&tx, &ident, &location)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn drop_table(&self, ident: &TableIdent) -> CatalogResult<TableEntry> {
        let ident = ident.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let entry = load_entry(&tx, &ident)?
                .ok_or_else(|| CatalogError::NoSuchTable(ident.to_string()))?;
            tx.execute(
                "DELETE FROM iceberg_tables \
                 WHERE catalog_name = ?1 AND table_namespace = ?2 AND table_name = ?3",
                params![CATALOG_NAME, encode_namespace(&ident.namespace)?, ident.name],
            )?;
            tx.commit()?;
            Ok(entry)
        })
        .await
    }

    async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> CatalogResult<()> {
        let from = from.clone();
        let to = to.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if load_entry(&tx, &from)?.is_none() {
                return Err(CatalogError::NoSuchTable(from.to_string()));
            }
            let to_ns = encode_namespace(&to.namespace)?;
            if !namespace_exists_tx(&tx, &to_ns)? {
                return Err(CatalogError::NoSuchNamespace(namespace_name(&to.namespace)));
            }
            if load_entry(&tx, &to)?.is_some() {
                return Err(CatalogError::AlreadyExists {
                    entity: "Table",
                    name: to.to_string(),
                });
            }
            tx.execute(
                "UPDATE iceberg_tables SET table_namespace = ?1, table_name = ?2 \
                 WHERE catalog_name = ?3 AND table_namespace = ?4 AND table_name = ?5",
                params![
                    to_ns,
                    to.name,
                    CATALOG_NAME,
                    encode_namespace(&from.namespace)?,
                    from.name
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn commit_tables(&self, commits: &[TableCommit]) -> CatalogResult<()> {
        let commits = commits.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for commit in &commits {
                match &commit.expected_location {
                    None => {
                        insert_table(&tx, &commit.ident, &commit.new_location).map_err(
                            |err| match err {
                                CatalogError::AlreadyExists { name, .. } => {
                                    CatalogError::CommitFailed(format!(
                                        "Table already exists: {name}"
                                    ))
                                }
                                other => other,
                            },
                        )?;
                    }
                    Some(expected) => {
                        let updated = tx.execute(
                            "UPDATE iceberg_tables \
                             SET metadata_location = ?1, previous_metadata_location = ?2 \
                             WHERE catalog_name = ?3 AND table_namespace = ?4 \
                             AND table_name = ?5 AND metadata_location = ?2",
                            params![
                                commit.new_location,
                                expected,
                                CATALOG_NAME,
                                encode_namespace(&commit.ident.namespace)?,
                                commit.ident.name
                            ],
                        )?;
                        if updated == 0 {
                            // Dropping `tx` rolls back earlier updates in the batch.
                            return Err(match load_entry(&tx, &commit.ident)? {
                                None => CatalogError::NoSuchTable(commit.ident.to_string()),
                                Some(entry) => CatalogError::CommitFailed(format!(
                                    "Metadata location for {} changed: expected {expected}, found {}",
                                    commit.ident, entry.metadata_location
                                )),
                            });
                        }
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> CatalogResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}
