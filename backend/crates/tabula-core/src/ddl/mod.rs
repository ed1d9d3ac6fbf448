//! Identifier validation and DDL text generation.
//!
//! Nothing in this module touches storage. `NameValidator` runs first on
//! every structural request; `DdlGenerator` turns descriptors into statement
//! text that callers execute.

mod generator;
mod validator;

pub use generator::{DdlGenerator, TableDefinition};
pub use validator::NameValidator;

/// Implicit primary key present on every user table.
pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Columns the platform manages; callers cannot declare, rename or drop them.
pub const IMPLICIT_COLUMNS: &[&str] = &[ID_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN];

pub fn is_implicit_column(name: &str) -> bool {
    IMPLICIT_COLUMNS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(name))
}
