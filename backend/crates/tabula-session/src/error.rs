use thiserror::Error;

/// Errors raised while resolving caller permissions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Authentication required to {operation} table '{table}'")]
    AuthenticationRequired { table: String, operation: String },

    #[error("Access denied to table '{table}' for {caller}: {reason}")]
    AccessDenied {
        table: String,
        caller: String,
        reason: String,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
