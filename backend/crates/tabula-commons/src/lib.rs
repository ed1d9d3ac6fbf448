//! # tabula-commons
//!
//! Shared types used by every Tabula crate: the schema descriptors read from
//! the storage engine, caller identity, snapshot and search models, the
//! system table enumeration and identifier rules.
//!
//! This crate performs no I/O.

pub mod errors;
pub mod identifiers;
pub mod models;
pub mod system_tables;

pub use errors::{CommonError, Result};
pub use identifiers::{is_valid_identifier, quote_ident, validate_identifier, IdentifierKind};
pub use models::*;
pub use system_tables::{ProtectedTables, SystemTable, DEFAULT_RESERVED_PREFIXES};
