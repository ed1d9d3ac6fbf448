//! Object-storage port used for best-effort mirroring of snapshot blobs.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

use crate::storage_trait::{Result, StorageError};

/// Minimal key/text object store.
#[async_trait::async_trait]
pub trait ObjectStoragePort: Send + Sync {
    /// Read an object; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write an object, replacing any existing one.
    async fn put(&self, key: &str, text: String) -> Result<()>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// `ObjectStoragePort` over any `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreMirror {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreMirror {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Store objects as files under `root` (created if missing).
    pub fn local<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create mirror directory {}: {}",
                root.display(),
                e
            ))
        })?;
        let fs = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self::new(Arc::new(fs)))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

#[async_trait::async_trait]
impl ObjectStoragePort for ObjectStoreMirror {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let location = ObjectPath::from(key);
        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(StorageError::Other(e.to_string())),
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    async fn put(&self, key: &str, text: String) -> Result<()> {
        let location = ObjectPath::from(key);
        self.store
            .put(&location, Bytes::from(text).into())
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let location = ObjectPath::from(key);
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(StorageError::Other(e.to_string())),
        }
    }
}
