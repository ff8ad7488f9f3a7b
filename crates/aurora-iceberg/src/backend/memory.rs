//! Process-local catalog backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    CatalogBackend, CatalogError, CatalogResult, PropertiesUpdate, TableCommit, TableEntry,
    apply_property_changes, child_namespaces, is_descendant, namespace_name,
};
use crate::types::{NamespaceIdent, TableIdent};

#[derive(Debug, Default)]
struct MemoryState {
    namespaces: BTreeMap<NamespaceIdent, HashMap<String, String>>,
    tables: BTreeMap<TableIdent, TableEntry>,
}

impl MemoryState {
    fn require_namespace(&self, namespace: &NamespaceIdent) -> CatalogResult<()> {
        if self.namespaces.contains_key(namespace) {
            Ok(())
        } else {
            Err(CatalogError::NoSuchNamespace(namespace_name(namespace)))
        }
    }
}

/// In-memory backend. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
    ) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        if state.namespaces.contains_key(namespace) {
            return Err(CatalogError::AlreadyExists {
                entity: "Namespace",
                name: namespace_name(namespace),
            });
        }
        state.namespaces.insert(namespace.clone(), properties);
        Ok(())
    }

    async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
    ) -> CatalogResult<Vec<NamespaceIdent>> {
        let state = self.state.read().await;
        let children = child_namespaces(state.namespaces.keys(), parent);
        // A parent implied by its children exists for listing.
        if let Some(parent) = parent {
            if children.is_empty() {
                state.require_namespace(parent)?;
            }
        }
        Ok(children)
    }

    async fn load_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> CatalogResult<HashMap<String, String>> {
        let state = self.state.read().await;
        state
            .namespaces
            .get(namespace)
            .cloned()
            .ok_or_else(|| CatalogError::NoSuchNamespace(namespace_name(namespace)))
    }

    async fn namespace_exists(&self, namespace: &NamespaceIdent) -> CatalogResult<bool> {
        Ok(self.state.read().await.namespaces.contains_key(namespace))
    }

    async fn drop_namespace(&self, namespace: &NamespaceIdent) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        state.require_namespace(namespace)?;
        let has_tables = state.tables.keys().any(|t| &t.namespace == namespace);
        let has_children = state
            .namespaces
            .keys()
            .any(|candidate| is_descendant(candidate, namespace));
        if has_tables || has_children {
            return Err(CatalogError::NamespaceNotEmpty(namespace_name(namespace)));
        }
        state.namespaces.remove(namespace);
        Ok(())
    }

    async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        removals: &[String],
        updates: &HashMap<String, String>,
    ) -> CatalogResult<PropertiesUpdate> {
        let mut state = self.state.write().await;
        let properties = state
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| CatalogError::NoSuchNamespace(namespace_name(namespace)))?;
        Ok(apply_property_changes(properties, removals, updates))
    }

    async fn list_tables(&self, namespace: &NamespaceIdent) -> CatalogResult<Vec<TableIdent>> {
        let state = self.state.read().await;
        state.require_namespace(namespace)?;
        Ok(state
            .tables
            .keys()
            .filter(|ident| &ident.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn load_table(&self, ident: &TableIdent) -> CatalogResult<Option<TableEntry>> {
        Ok(self.state.read().await.tables.get(ident).cloned())
    }

    async fn create_table(&self, ident: &TableIdent, metadata_location: &str) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        state.require_namespace(&ident.namespace)?;
        if state.tables.contains_key(ident) {
            return Err(CatalogError::AlreadyExists {
                entity: "Table",
                name: ident.to_string(),
            });
        }
        state.tables.insert(
            ident.clone(),
            TableEntry {
                ident: ident.clone(),
                metadata_location: metadata_location.to_string(),
                previous_metadata_location: None,
            },
        );
        Ok(())
    }

    async fn drop_table(&self, ident: &TableIdent) -> CatalogResult<TableEntry> {
        self.state
            .write()
            .await
            .tables
            .remove(ident)
            .ok_or_else(|| CatalogError::NoSuchTable(ident.to_string()))
    }

    async fn rename_table(&self, from: &TableIdent, to: &TableIdent) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        if !state.tables.contains_key(from) {
            return Err(CatalogError::NoSuchTable(from.to_string()));
        }
        state.require_namespace(&to.namespace)?;
        if state.tables.contains_key(to) {
            return Err(CatalogError::AlreadyExists {
                entity: "Table",
                name: to.to_string(),
            });
        }
        if let Some(mut entry) = state.tables.remove(from) {
            entry.ident = to.clone();
            state.tables.insert(to.clone(), entry);
        }
        Ok(())
    }

    async fn commit_tables(&self, commits: &[TableCommit]) -> CatalogResult<()> {
        let mut state = self.state.write().await;

        // Validate everything before touching anything.
        for commit in commits {
            let current = state.tables.get(&commit.ident);
            match (&commit.expected_location, current) {
                (None, Some(_)) => {
                    return Err(CatalogError::CommitFailed(format!(
                        "Table already exists: {}",
                        commit.ident
                    )));
                }
                (None, None) => state.require_namespace(&commit.ident.namespace)?,
                (Some(_), None) => {
                    return Err(CatalogError::NoSuchTable(commit.ident.to_string()));
                }
                (Some(expected), Some(entry)) if &entry.metadata_location != expected => {
                    return Err(CatalogError::CommitFailed(format!(
                        "Metadata location for {} changed: expected {expected}, found {}",
                        commit.ident, entry.metadata_location
                    )));
                }
                (Some(_), Some(_)) => {}
            }
        }

        for commit in commits {
            state.tables.insert(
                commit.ident.clone(),
                TableEntry {
                    ident: commit.ident.clone(),
                    metadata_location: commit.new_location.clone(),
                    previous_metadata_location: commit.expected_location.clone(),
                },
            );
        }
        Ok(())
    }
}
