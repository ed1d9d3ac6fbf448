//! System table enumeration and the protected-name set.
//!
//! `SystemTable` lists the tables the platform owns. `ProtectedTables` is the
//! immutable set of names the core refuses to create, alter, drop or expose
//! through raw queries. It is built once (normally from `SystemTable::all()`
//! plus configured extras) and passed into the core at construction, so tests
//! can substitute their own set.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::errors::{CommonError, Result};

/// System table enumeration
///
/// Tables owned by the platform. Some are created by this core at bootstrap
/// (`table_metadata`, `schema_snapshots`, `system_counters`); the rest belong
/// to external collaborators (auth, push) and are only protected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTable {
    /// users - End-user accounts
    Users,
    /// sessions - Issued sessions
    Sessions,
    /// api_keys - API key registry
    ApiKeys,
    /// table_metadata - Access policy and owner column per user table
    TableMetadata,
    /// schema_snapshots - Point-in-time schema captures
    SchemaSnapshots,
    /// system_counters - Monotonic counters (snapshot versions)
    SystemCounters,
    /// push_subscriptions - Push notification endpoints
    PushSubscriptions,
}

impl SystemTable {
    /// Get the table name as used in SQL
    pub fn table_name(&self) -> &'static str {
        match self {
            SystemTable::Users => "users",
            SystemTable::Sessions => "sessions",
            SystemTable::ApiKeys => "api_keys",
            SystemTable::TableMetadata => "table_metadata",
            SystemTable::SchemaSnapshots => "schema_snapshots",
            SystemTable::SystemCounters => "system_counters",
            SystemTable::PushSubscriptions => "push_subscriptions",
        }
    }

    /// Parse from table name (case-insensitive)
    pub fn from_name(name: &str) -> std::result::Result<Self, String> {
        match name.to_ascii_lowercase().as_str() {
            "users" => Ok(SystemTable::Users),
            "sessions" => Ok(SystemTable::Sessions),
            "api_keys" => Ok(SystemTable::ApiKeys),
            "table_metadata" => Ok(SystemTable::TableMetadata),
            "schema_snapshots" => Ok(SystemTable::SchemaSnapshots),
            "system_counters" => Ok(SystemTable::SystemCounters),
            "push_subscriptions" => Ok(SystemTable::PushSubscriptions),
            _ => Err(format!("Unknown system table: {}", name)),
        }
    }

    /// Get all system tables
    pub fn all() -> &'static [SystemTable] {
        &[
            SystemTable::Users,
            SystemTable::Sessions,
            SystemTable::ApiKeys,
            SystemTable::TableMetadata,
            SystemTable::SchemaSnapshots,
            SystemTable::SystemCounters,
            SystemTable::PushSubscriptions,
        ]
    }

    /// Tables this core creates on bootstrap
    pub fn core_owned() -> &'static [SystemTable] {
        &[
            SystemTable::TableMetadata,
            SystemTable::SchemaSnapshots,
            SystemTable::SystemCounters,
        ]
    }
}

impl fmt::Display for SystemTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Engine-reserved prefixes protected by default (SQLite internals, D1 internals).
pub const DEFAULT_RESERVED_PREFIXES: &[&str] = &["sqlite_", "_cf_"];

/// Immutable set of protected table names and reserved prefixes.
///
/// Matching is case-insensitive because the storage engine resolves table
/// names case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedTables {
    inner: Arc<ProtectedInner>,
}

#[derive(Debug, PartialEq, Eq)]
struct ProtectedInner {
    names: BTreeSet<String>,
    prefixes: Vec<String>,
}

impl ProtectedTables {
    /// Build a set from explicit names and prefixes.
    pub fn new<N, P>(names: N, prefixes: P) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            inner: Arc::new(ProtectedInner {
                names: names
                    .into_iter()
                    .map(|n| n.as_ref().to_ascii_lowercase())
                    .collect(),
                prefixes: prefixes
                    .into_iter()
                    .map(|p| p.as_ref().to_ascii_lowercase())
                    .collect(),
            }),
        }
    }

    /// Every `SystemTable` plus the default reserved prefixes and `extra` names.
    pub fn with_system_tables<I>(extra: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let names = SystemTable::all()
            .iter()
            .map(|t| t.table_name().to_string())
            .chain(extra.into_iter().map(|n| n.as_ref().to_string()))
            .collect::<Vec<_>>();
        Self::new(names, DEFAULT_RESERVED_PREFIXES.iter().copied())
    }

    /// Check whether a table name is protected.
    pub fn is_protected(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.inner.names.contains(&lower)
            || self.inner.prefixes.iter().any(|p| lower.starts_with(p.as_str()))
    }

    /// Fail with `SystemTableProtected` when the name is protected.
    pub fn ensure_not_protected(&self, name: &str) -> Result<()> {
        if self.is_protected(name) {
            Err(CommonError::protected(name))
        } else {
            Ok(())
        }
    }

    /// Protected names (lowercase, sorted).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.names.iter().map(String::as_str)
    }

    /// Reserved prefixes (lowercase).
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.inner.prefixes.iter().map(String::as_str)
    }
}

impl Default for ProtectedTables {
    fn default() -> Self {
        Self::with_system_tables(std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name() {
        assert_eq!(SystemTable::Users.table_name(), "users");
        assert_eq!(SystemTable::SchemaSnapshots.table_name(), "schema_snapshots");
        assert_eq!(SystemTable::SchemaSnapshots.to_string(), "schema_snapshots");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(SystemTable::from_name("USERS").unwrap(), SystemTable::Users);
        assert_eq!(SystemTable::from_name("api_keys").unwrap(), SystemTable::ApiKeys);
        assert!(SystemTable::from_name("orders").is_err());
    }

    #[test]
    fn test_default_protected_set() {
        let protected = ProtectedTables::default();
        for table in SystemTable::all() {
            assert!(protected.is_protected(table.table_name()));
        }
        assert!(protected.is_protected("Users"));
        assert!(protected.is_protected("sqlite_master"));
        assert!(protected.is_protected("_cf_KV"));
        assert!(!protected.is_protected("orders"));
        assert!(!protected.is_protected("user_profiles"));
    }

    #[test]
    fn test_injected_set() {
        let protected = ProtectedTables::new(["ledger"], Vec::<String>::new());
        assert!(protected.is_protected("LEDGER"));
        assert!(!protected.is_protected("users"));
        assert!(!protected.is_protected("sqlite_master"));

        let err = protected.ensure_not_protected("ledger").unwrap_err();
        assert!(matches!(err, CommonError::SystemTableProtected(_)));
    }

    #[test]
    fn test_extra_names() {
        let protected = ProtectedTables::with_system_tables(["audit_trail"]);
        assert!(protected.is_protected("audit_trail"));
        assert!(protected.is_protected("sessions"));
    }
}
