//! File IO for Iceberg metadata files.
//!
//! Metadata JSON is addressed by location URI. `memory://` locations live in
//! process memory; `file:` URLs and absolute paths go to the local
//! filesystem. Writes never overwrite an existing file, so two writers racing
//! on the same metadata location cannot clobber each other.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::backend::{CatalogError, CatalogResult};

/// Scheme prefix for in-memory locations.
pub const MEMORY_SCHEME: &str = "memory://";

/// Reads and writes metadata files by location.
#[async_trait]
pub trait FileIo: Send + Sync + 'static {
    /// Reads the whole file.
    async fn read(&self, location: &str) -> CatalogResult<Bytes>;

    /// Writes a new file. Fails with `CommitFailed` if it already exists.
    async fn write(&self, location: &str, data: Bytes) -> CatalogResult<()>;

    /// Deletes a file. Deleting a missing file is not an error.
    async fn delete(&self, location: &str) -> CatalogResult<()>;

    /// Returns true if the file exists.
    async fn exists(&self, location: &str) -> CatalogResult<bool>;
}

/// In-memory file store for `memory://` locations.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileIo {
    files: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryFileIo {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> CatalogError {
        CatalogError::Storage("memory file io lock poisoned".into())
    }
}

#[async_trait]
impl FileIo for MemoryFileIo {
    async fn read(&self, location: &str) -> CatalogResult<Bytes> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        files
            .get(location)
            .cloned()
            .ok_or_else(|| CatalogError::FileNotFound(location.to_string()))
    }

    async fn write(&self, location: &str, data: Bytes) -> CatalogResult<()> {
        let mut files = self.files.write().map_err(|_| Self::poisoned())?;
        if files.contains_key(location) {
            return Err(CatalogError::CommitFailed(format!(
                "Metadata file already exists: {location}"
            )));
        }
        files.insert(location.to_string(), data);
        Ok(())
    }

    async fn delete(&self, location: &str) -> CatalogResult<()> {
        let mut files = self.files.write().map_err(|_| Self::poisoned())?;
        files.remove(location);
        Ok(())
    }

    async fn exists(&self, location: &str) -> CatalogResult<bool> {
        let files = self.files.read().map_err(|_| Self::poisoned())?;
        Ok(files.contains_key(location))
    }
}

/// Local filesystem IO for `file:` URLs and absolute paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileIo;

impl LocalFileIo {
    /// Converts a location to a filesystem path.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the location is neither a `file:` URL
    /// nor an absolute path.
    pub fn to_path(location: &str) -> CatalogResult<PathBuf> {
        let path = if let Some(rest) = location.strip_prefix("file://") {
            rest
        } else if let Some(rest) = location.strip_prefix("file:") {
            rest
        } else {
            location
        };
        if !path.starts_with('/') {
            return Err(CatalogError::Validation(format!(
                "Location '{location}' is not an absolute file path"
            )));
        }
        Ok(PathBuf::from(path))
    }
}

fn io_error(location: &str, err: &std::io::Error) -> CatalogError {
    if err.kind() == ErrorKind::NotFound {
        CatalogError::FileNotFound(location.to_string())
    } else {
        CatalogError::Storage(format!("{location}: {err}"))
    }
}

#[async_trait]
impl FileIo for LocalFileIo {
    async fn read(&self, location: &str) -> CatalogResult<Bytes> {
        let path = Self::to_path(location)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(location, &e))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, location: &str, data: Bytes) -> CatalogResult<()> {
        let path = Self::to_path(location)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(location, &e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    CatalogError::CommitFailed(format!("Metadata file already exists: {location}"))
                } else {
                    io_error(location, &e)
                }
            })?;
        file.write_all(&data)
            .await
            .map_err(|e| io_error(location, &e))?;
        file.sync_all().await.map_err(|e| io_error(location, &e))?;
        Ok(())
    }

    async fn delete(&self, location: &str) -> CatalogResult<()> {
        let path = Self::to_path(location)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(location, &e)),
        }
    }

    async fn exists(&self, location: &str) -> CatalogResult<bool> {
        let path = Self::to_path(location)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(location, &e))
    }
}

/// Dispatches to the memory or local implementation by location scheme.
#[derive(Debug, Default, Clone)]
pub struct ResolvingFileIo {
    memory: MemoryFileIo,
    local: LocalFileIo,
}

impl ResolvingFileIo {
    /// Creates a resolver with a fresh in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, location: &str) -> CatalogResult<&dyn FileIo> {
        if location.starts_with(MEMORY_SCHEME) {
            Ok(&self.memory)
        } else if location.starts_with("file:") || location.starts_with('/') {
            Ok(&self.local)
        } else {
            let scheme = location.split_once(':').map_or(location, |(s, _)| s);
            Err(CatalogError::Validation(format!(
                "Unsupported location scheme '{scheme}' in '{location}'"
            )))
        }
    }
}

#[async_trait]
impl FileIo for ResolvingFileIo {
    async fn read(&self, location: &str) -> CatalogResult<Bytes> {
        self.resolve(location)?.read(location).await
    }

    async fn write(&self, location: &str, data: Bytes) -> CatalogResult<()> {
        self.resolve(location)?.write(location, data).await
    }

    async fn delete(&self, location: &str) -> CatalogResult<()> {
        self.resolve(location)?.delete(location).await
    }

    async fn exists(&self, location: &str) -> CatalogResult<bool> {
        self.resolve(location)?.exists(location).await
    }
}
