//! Bootstrap and maintenance statements for the core-owned system tables.

use std::sync::Arc;

use tabula_commons::{AccessPolicy, SystemTable};
use tabula_store::{SqlStorage, SqlStorageAsync, Statement};

use crate::error::Result;

/// Counter row that hands out snapshot versions.
pub const SNAPSHOT_VERSION_COUNTER: &str = "snapshot_version";

fn create_statement(table: SystemTable) -> Option<&'static str> {
    match table {
        SystemTable::TableMetadata => Some(
            "CREATE TABLE IF NOT EXISTS table_metadata (\
             table_name TEXT NOT NULL PRIMARY KEY COLLATE NOCASE, \
             access_policy TEXT NOT NULL DEFAULT 'public', \
             owner_column TEXT, \
             created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        ),
        SystemTable::SchemaSnapshots => Some(
            "CREATE TABLE IF NOT EXISTS schema_snapshots (\
             id TEXT NOT NULL PRIMARY KEY, \
             version INTEGER NOT NULL UNIQUE, \
             name TEXT, \
             description TEXT, \
             full_schema TEXT NOT NULL, \
             tables_json TEXT NOT NULL, \
             content_hash TEXT NOT NULL, \
             created_at TEXT NOT NULL, \
             created_by TEXT, \
             snapshot_type TEXT NOT NULL, \
             mirror_key TEXT)",
        ),
        SystemTable::SystemCounters => Some(
            "CREATE TABLE IF NOT EXISTS system_counters (\
             name TEXT NOT NULL PRIMARY KEY, \
             value INTEGER NOT NULL)",
        ),
        SystemTable::Users
        | SystemTable::Sessions
        | SystemTable::ApiKeys
        | SystemTable::PushSubscriptions => None,
    }
}

/// Create the core-owned system tables if they are missing.
pub async fn ensure_system_tables(storage: &Arc<dyn SqlStorage>) -> Result<()> {
    let statements: Vec<Statement> = SystemTable::core_owned()
        .iter()
        .filter_map(|t| create_statement(*t))
        .map(Statement::new)
        .collect();
    storage.batch_async(statements).await?;
    log::debug!("✓ System tables ready");
    Ok(())
}

pub fn upsert_table_metadata(
    table: &str,
    policy: AccessPolicy,
    owner_column: Option<&str>,
) -> Statement {
    Statement::new(
        "INSERT OR REPLACE INTO table_metadata (table_name, access_policy, owner_column) \
         VALUES (?, ?, ?)",
    )
    .bind(table)
    .bind(policy.as_str())
    .bind(owner_column)
}

pub fn delete_table_metadata(table: &str) -> Statement {
    Statement::new("DELETE FROM table_metadata WHERE table_name = ?").bind(table)
}

pub fn clear_table_metadata() -> Statement {
    Statement::new("DELETE FROM table_metadata")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_store::test_utils::TestDb;

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let db = TestDb::new().unwrap();
        let storage = db.storage();
        ensure_system_tables(&storage).await.unwrap();
        ensure_system_tables(&storage).await.unwrap();

        let rows = storage
            .all_async(Statement::new(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            ))
            .await
            .unwrap();
        let names: Vec<_> = rows.iter().filter_map(|r| r.get_string("name")).collect();
        assert_eq!(names, ["schema_snapshots", "system_counters", "table_metadata"]);
    }
}
