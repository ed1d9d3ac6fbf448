// Error types module
use tabula_commons::{CommonError, IdentifierKind, ValidationResult};
use tabula_session::SessionError;
use tabula_store::StorageError;
use thiserror::Error;

/// Main error type for the Tabula core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TabulaError {
    #[error("Invalid {kind} name '{name}': must match ^[A-Za-z_][A-Za-z0-9_]*$")]
    InvalidIdentifier { kind: IdentifierKind, name: String },

    #[error("Table '{0}' is a protected system table")]
    SystemTableProtected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {} ({conflicting_rows} conflicting rows)", .errors.join("; "))]
    ValidationFailed {
        errors: Vec<String>,
        conflicting_rows: u64,
    },

    #[error("Already exists: {0}")]
    DuplicateName(String),

    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TabulaError>;

impl TabulaError {
    pub fn table_not_found(table: &str) -> Self {
        TabulaError::NotFound(format!("Table '{}' not found", table))
    }

    pub fn column_not_found(table: &str, column: &str) -> Self {
        TabulaError::NotFound(format!("Column '{}' not found in table '{}'", column, table))
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        TabulaError::InvalidInput(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        TabulaError::UnsupportedQuery(msg.into())
    }
}

impl From<ValidationResult> for TabulaError {
    fn from(result: ValidationResult) -> Self {
        TabulaError::ValidationFailed {
            errors: result.errors,
            conflicting_rows: result.conflicting_rows,
        }
    }
}

impl From<StorageError> for TabulaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(msg) => TabulaError::DuplicateName(msg),
            other => TabulaError::StorageFailure(other.to_string()),
        }
    }
}

impl From<CommonError> for TabulaError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::InvalidIdentifier { kind, name } => {
                TabulaError::InvalidIdentifier { kind, name }
            }
            CommonError::SystemTableProtected(name) => TabulaError::SystemTableProtected(name),
            CommonError::InvalidInput(msg) => TabulaError::InvalidInput(msg),
        }
    }
}

impl From<SessionError> for TabulaError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AuthenticationRequired { .. } => {
                TabulaError::AuthenticationRequired(err.to_string())
            }
            SessionError::AccessDenied { .. } => TabulaError::AccessDenied(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TabulaError {
    fn from(err: serde_json::Error) -> Self {
        TabulaError::StorageFailure(format!("Serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let err: TabulaError = StorageError::AlreadyExists("table t already exists".into()).into();
        assert!(matches!(err, TabulaError::DuplicateName(_)));

        let err: TabulaError = StorageError::Sql("no such column".into()).into();
        assert!(matches!(err, TabulaError::StorageFailure(_)));
    }

    #[test]
    fn test_validation_failed_display() {
        let mut result = ValidationResult::ok();
        result.fail("3 rows contain NULL", 3);
        let err: TabulaError = result.into();
        assert_eq!(
            err.to_string(),
            "Validation failed: 3 rows contain NULL (3 conflicting rows)"
        );
    }

    #[test]
    fn test_session_error_mapping() {
        let err: TabulaError = SessionError::AuthenticationRequired {
            table: "notes".into(),
            operation: "write to".into(),
        }
        .into();
        assert!(matches!(err, TabulaError::AuthenticationRequired(_)));
    }
}
