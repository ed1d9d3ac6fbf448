//! # tabula-core
//!
//! Schema management, row-level access control and schema snapshots over a
//! SQL storage port.
//!
//! ```text
//! AppContext
//!   ├── SchemaManager ── NameValidator · ColumnChangeValidator · ColumnChangeApplier
//!   ├── SchemaCatalog (reflection + table_metadata)
//!   ├── AccessControlGate ── DataService
//!   ├── IndexManager · SearchIndexResolver
//!   ├── SnapshotStore
//!   └── RawQueryExecutor (SqlGuard)
//! ```

pub mod access;
pub mod app_context;
pub mod catalog;
pub mod data;
pub mod ddl;
pub mod error;
pub mod indexes;
pub mod recreation;
pub mod schema;
pub mod search;
pub mod snapshots;
pub mod sql;
pub mod system_schema;
pub mod test_helpers;
pub mod validation;

pub use access::AccessControlGate;
pub use app_context::AppContext;
pub use catalog::{SchemaCatalog, TablePolicy, TableShape};
pub use data::DataService;
pub use error::{Result, TabulaError};
pub use indexes::IndexManager;
pub use recreation::{AppliedChange, ColumnChange, ColumnChangeApplier};
pub use schema::SchemaManager;
pub use search::SearchIndexResolver;
pub use snapshots::{NewSnapshot, RestoreReport, SnapshotStore};
pub use sql::{RawQueryExecutor, SqlGuard};
pub use validation::ColumnChangeValidator;
