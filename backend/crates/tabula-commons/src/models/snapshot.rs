//! Schema snapshot models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::schema::AccessPolicy;

/// How a snapshot came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    /// Requested explicitly by a caller
    Manual,
    /// Taken on a schedule by the host
    Auto,
    /// Taken automatically right before a structural change
    PreChange,
}

impl SnapshotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotType::Manual => "manual",
            SnapshotType::Auto => "auto",
            SnapshotType::PreChange => "pre_change",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(SnapshotType::Manual),
            "auto" => Some(SnapshotType::Auto),
            "pre_change" => Some(SnapshotType::PreChange),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTable {
    pub name: String,
    /// `CREATE TABLE` text as stored by the engine
    pub sql: String,
    #[serde(default)]
    pub access_policy: AccessPolicy,
    #[serde(default)]
    pub owner_column: Option<String>,
    /// `CREATE INDEX` statements for indexes owned by the table
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// Immutable capture of the full user-table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub id: String,
    pub version: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    /// All definitions joined into one script
    pub full_schema: String,
    pub tables: Vec<SnapshotTable>,
    /// SHA-256 (hex) of the serialized table list
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub snapshot_type: SnapshotType,
    /// Object key of the mirrored copy, when mirroring is configured
    pub mirror_key: Option<String>,
}

impl SchemaSnapshot {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Page of snapshots, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPage {
    pub snapshots: Vec<SchemaSnapshot>,
    pub total: u64,
}

/// Textual diff between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotComparison {
    pub from_id: String,
    pub to_id: String,
    pub from_version: i64,
    pub to_version: i64,
    /// Tables present only in the second snapshot
    pub added: Vec<String>,
    /// Tables present only in the first snapshot
    pub removed: Vec<String>,
    /// Tables present in both whose definition text differs
    pub modified: Vec<String>,
}

impl SnapshotComparison {
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}
