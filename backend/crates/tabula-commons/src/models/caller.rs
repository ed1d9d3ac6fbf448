//! Caller identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type-safe wrapper for caller identifiers (end-user or admin ids).
///
/// Ensures caller ids cannot be accidentally used where table or column names
/// are expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallerId(String);

/// Error type for CallerId validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdValidationError(pub String);

impl fmt::Display for CallerIdValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CallerIdValidationError {}

impl CallerId {
    /// Creates a CallerId, returning an error if validation fails.
    pub fn try_new(id: impl Into<String>) -> Result<Self, CallerIdValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CallerIdValidationError("Caller ID cannot be empty".to_string()));
        }
        if id.contains('\0') {
            return Err(CallerIdValidationError(
                "Caller ID cannot contain null bytes".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Creates a CallerId from a string.
    ///
    /// # Panics
    /// Panics if the id is empty or contains null bytes. Use `try_new()` for fallible creation.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("CallerId contains invalid characters")
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for CallerId {
    type Error = CallerIdValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<CallerId> for String {
    fn from(value: CallerId) -> Self {
        value.0
    }
}

impl AsRef<str> for CallerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller kind without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    Admin,
    EndUser,
    ApiKey,
    Anonymous,
}

impl CallerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallerKind::Admin => "admin",
            CallerKind::EndUser => "end_user",
            CallerKind::ApiKey => "api_key",
            CallerKind::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for CallerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the caller, supplied by the authentication collaborator.
///
/// A closed union: every call site that makes a policy decision matches on
/// all four variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessContext {
    Admin {
        #[serde(default)]
        caller_id: Option<CallerId>,
    },
    EndUser {
        #[serde(default)]
        caller_id: Option<CallerId>,
    },
    ApiKey {
        #[serde(default)]
        key_id: Option<String>,
    },
    Anonymous,
}

impl AccessContext {
    pub fn admin(caller_id: impl Into<String>) -> Self {
        AccessContext::Admin {
            caller_id: Some(CallerId::new(caller_id)),
        }
    }

    pub fn end_user(caller_id: impl Into<String>) -> Self {
        AccessContext::EndUser {
            caller_id: Some(CallerId::new(caller_id)),
        }
    }

    /// End-user request whose identity could not be resolved.
    pub fn unresolved_end_user() -> Self {
        AccessContext::EndUser { caller_id: None }
    }

    pub fn api_key(key_id: impl Into<String>) -> Self {
        AccessContext::ApiKey {
            key_id: Some(key_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        AccessContext::Anonymous
    }

    pub fn kind(&self) -> CallerKind {
        match self {
            AccessContext::Admin { .. } => CallerKind::Admin,
            AccessContext::EndUser { .. } => CallerKind::EndUser,
            AccessContext::ApiKey { .. } => CallerKind::ApiKey,
            AccessContext::Anonymous => CallerKind::Anonymous,
        }
    }

    /// Resolved caller id (admins and end users only).
    pub fn caller_id(&self) -> Option<&CallerId> {
        match self {
            AccessContext::Admin { caller_id } | AccessContext::EndUser { caller_id } => {
                caller_id.as_ref()
            }
            AccessContext::ApiKey { .. } | AccessContext::Anonymous => None,
        }
    }

    /// Identifier suitable for logs and `created_by` fields.
    pub fn display_id(&self) -> String {
        match self {
            AccessContext::Admin { caller_id } | AccessContext::EndUser { caller_id } => caller_id
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_else(|| "unresolved".to_string()),
            AccessContext::ApiKey { key_id } => {
                format!("api_key:{}", key_id.as_deref().unwrap_or("unknown"))
            }
            AccessContext::Anonymous => "anonymous".to_string(),
        }
    }
}
