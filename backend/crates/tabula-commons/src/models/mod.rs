pub mod caller;
pub mod page;
pub mod schema;
pub mod search;
pub mod snapshot;

pub use caller::{AccessContext, CallerId, CallerKind};
pub use page::{PageRequest, Record, RecordPage, SortOrder};
pub use schema::{
    AccessPolicy, ColumnChangeRequest, ColumnDefault, ColumnDescriptor, ColumnSpec,
    CreateTableOptions, DataType, ForeignKeyChange, ForeignKeyDescriptor, ForeignKeyTarget,
    IndexDescriptor, TableDescriptor, TableKind, TypeAffinity, ValidationResult, DEFAULT_KEYWORDS,
};
pub use search::{SearchOperator, SearchPredicate, SearchResult, SearchableColumn};
pub use snapshot::{SchemaSnapshot, SnapshotComparison, SnapshotPage, SnapshotTable, SnapshotType};
