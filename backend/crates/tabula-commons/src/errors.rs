//! Shared error types for Tabula.
//!
//! These errors are produced by pure validation code in this crate (identifier
//! rules, protected names, default expressions). Higher layers convert them
//! into their own error enums.
//!
//! ## Example Usage
//!
//! ```rust
//! use tabula_commons::errors::{CommonError, Result};
//!
//! fn require_name(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(CommonError::invalid_input("name cannot be empty"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

use crate::identifiers::IdentifierKind;

/// Common error type for validation performed without touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Name does not match `^[A-Za-z_][A-Za-z0-9_]*$`
    InvalidIdentifier { kind: IdentifierKind, name: String },

    /// Name belongs to the protected system table set
    SystemTableProtected(String),

    /// Malformed payload (bad default expression, unknown type name, ...)
    InvalidInput(String),
}

impl CommonError {
    /// Creates an InvalidIdentifier error.
    pub fn invalid_identifier(kind: IdentifierKind, name: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            name: name.into(),
        }
    }

    /// Creates a SystemTableProtected error.
    pub fn protected(name: impl Into<String>) -> Self {
        Self::SystemTableProtected(name.into())
    }

    /// Creates an InvalidInput error with a message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommonError::InvalidIdentifier { kind, name } => {
                write!(f, "Invalid {} name '{}'", kind, name)
            }
            CommonError::SystemTableProtected(name) => {
                write!(f, "Table '{}' is a protected system table", name)
            }
            CommonError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for CommonError {}

/// Result type alias using CommonError.
pub type Result<T> = std::result::Result<T, CommonError>;
