//! Test utilities for tabula-store.
//!
//! Provides helpers for setting up test databases with minimal boilerplate.

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use crate::sqlite_backend::{SqliteBackend, SqliteOptions};
use crate::storage_trait::{SqlStorage, StorageCapabilities};

/// Test database wrapper that automatically cleans up on drop.
pub struct TestDb {
    /// Storage handle
    pub storage: Arc<dyn SqlStorage>,
    /// Temporary directory for file-backed databases
    #[allow(dead_code)]
    temp_dir: Option<TempDir>,
}

impl TestDb {
    /// Create an in-memory test database.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tabula_store::test_utils::TestDb;
    ///
    /// let test_db = TestDb::new().unwrap();
    /// // Use test_db.storage for testing...
    /// ```
    pub fn new() -> Result<Self> {
        let backend = SqliteBackend::open_in_memory(SqliteOptions::default())?;
        Ok(Self {
            storage: Arc::new(backend),
            temp_dir: None,
        })
    }

    /// Create an in-memory test database that reports no in-place ALTER
    /// support, forcing the recreation path for every column change.
    pub fn without_alter_support() -> Result<Self> {
        let backend = SqliteBackend::open_in_memory(SqliteOptions::default())?
            .with_capabilities(StorageCapabilities::default());
        Ok(Self {
            storage: Arc::new(backend),
            temp_dir: None,
        })
    }

    /// Create a file-backed test database in a temporary directory.
    pub fn file_backed() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let backend =
            SqliteBackend::open(temp_dir.path().join("test.db"), SqliteOptions::default())?;
        Ok(Self {
            storage: Arc::new(backend),
            temp_dir: Some(temp_dir),
        })
    }

    /// Shared storage handle.
    pub fn storage(&self) -> Arc<dyn SqlStorage> {
        self.storage.clone()
    }
}
