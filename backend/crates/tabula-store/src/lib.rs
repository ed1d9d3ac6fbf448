//! # tabula-store
//!
//! The external ports the Tabula core depends on, and their default
//! implementations.
//!
//! ## Architecture
//!
//! ```text
//! tabula-core (schema management, access control, snapshots)
//!     ↓
//! tabula-store (SqlStorage / ObjectStoragePort / BackgroundTasks)
//!     ↓
//! SQLite (rusqlite) · object_store · tokio
//! ```

pub mod background;
pub mod object_storage;
pub mod sqlite_backend;
pub mod storage_trait;

pub use background::{BackgroundTasks, DeferredWork, TokioBackgroundTasks};
pub use object_storage::{ObjectStoragePort, ObjectStoreMirror};
pub use sqlite_backend::{SqliteBackend, SqliteOptions};
pub use storage_trait::{
    Result, Row, RunResult, SqlStorage, SqlStorageAsync, SqlValue, Statement,
    StorageCapabilities, StorageError,
};

// Make test_utils available for testing in dependent crates
pub mod test_utils;
