//! Schema snapshot store
//!
//! A snapshot captures every user table's definition text, index
//! definitions and access policy. Versions come from a counter row that is
//! bumped in the same batch that inserts the snapshot, so they only ever
//! increase, even after deletions.
//!
//! Mirroring to object storage is best effort: it runs on the background
//! port after the snapshot is persisted and its failures are only logged.

mod diff;

pub use diff::compare;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tabula_commons::{
    AccessPolicy, SchemaSnapshot, SnapshotComparison, SnapshotPage, SnapshotTable, SnapshotType,
};
use tabula_store::{
    BackgroundTasks, ObjectStoragePort, Row, SqlStorage, SqlStorageAsync, Statement,
};

use crate::catalog::SchemaCatalog;
use crate::ddl::{DdlGenerator, NameValidator};
use crate::error::{Result, TabulaError};
use crate::system_schema::{self, SNAPSHOT_VERSION_COUNTER};

/// Parameters of a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub snapshot_type: SnapshotType,
}

impl NewSnapshot {
    pub fn manual(name: Option<String>, description: Option<String>, created_by: Option<String>) -> Self {
        Self {
            name,
            description,
            created_by,
            snapshot_type: SnapshotType::Manual,
        }
    }

    /// Automatic capture taken right before a structural change.
    pub fn pre_change(operation: impl Into<String>) -> Self {
        Self {
            name: None,
            description: Some(operation.into()),
            created_by: None,
            snapshot_type: SnapshotType::PreChange,
        }
    }
}

/// Outcome of `restore_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub snapshot_id: String,
    pub version: i64,
    /// Tables recreated from the snapshot
    pub restored: Vec<String>,
    /// User tables absent from the snapshot that were dropped
    pub dropped: Vec<String>,
}

pub struct SnapshotStore {
    catalog: Arc<SchemaCatalog>,
    validator: NameValidator,
    mirror: Option<Arc<dyn ObjectStoragePort>>,
    mirror_prefix: String,
    background: Arc<dyn BackgroundTasks>,
    auto_snapshot: bool,
}

impl SnapshotStore {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        validator: NameValidator,
        mirror: Option<Arc<dyn ObjectStoragePort>>,
        mirror_prefix: impl Into<String>,
        background: Arc<dyn BackgroundTasks>,
        auto_snapshot: bool,
    ) -> Self {
        Self {
            catalog,
            validator,
            mirror,
            mirror_prefix: mirror_prefix.into(),
            background,
            auto_snapshot,
        }
    }

    fn storage(&self) -> &Arc<dyn SqlStorage> {
        self.catalog.storage()
    }

    pub fn auto_snapshot_enabled(&self) -> bool {
        self.auto_snapshot
    }

    pub async fn create_snapshot(
        &self,
        name: Option<String>,
        description: Option<String>,
        created_by: Option<String>,
    ) -> Result<SchemaSnapshot> {
        self.capture(NewSnapshot::manual(name, description, created_by))
            .await
    }

    /// Capture a `pre_change` snapshot when automatic snapshots are enabled.
    pub async fn capture_pre_change(&self, operation: &str) -> Result<Option<SchemaSnapshot>> {
        if !self.auto_snapshot {
            return Ok(None);
        }
        self.capture(NewSnapshot::pre_change(operation)).await.map(Some)
    }

    /// Persist a snapshot of every user table.
    pub async fn capture(&self, request: NewSnapshot) -> Result<SchemaSnapshot> {
        let tables = self.capture_tables().await?;
        let tables_json = serde_json::to_string(&tables)?;
        let content_hash = format!("{:x}", Sha256::digest(tables_json.as_bytes()));
        let full_schema = render_full_schema(&tables);

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let mirror_key = self.mirror.as_ref().map(|_| self.mirror_key(&id));

        let bump_counter = Statement::new(
            "INSERT INTO system_counters (name, value) \
             VALUES (?, COALESCE((SELECT MAX(version) FROM schema_snapshots), 0) + 1) \
             ON CONFLICT(name) DO UPDATE SET value = MAX(system_counters.value + 1, excluded.value)",
        )
        .bind(SNAPSHOT_VERSION_COUNTER);
        let insert = Statement::new(
            "INSERT INTO schema_snapshots (id, version, name, description, full_schema, \
             tables_json, content_hash, created_at, created_by, snapshot_type, mirror_key) \
             VALUES (?, (SELECT value FROM system_counters WHERE name = ?), ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(SNAPSHOT_VERSION_COUNTER)
        .bind(request.name.clone())
        .bind(request.description.clone())
        .bind(full_schema.as_str())
        .bind(tables_json.as_str())
        .bind(content_hash.as_str())
        .bind(created_at.to_rfc3339())
        .bind(request.created_by.clone())
        .bind(request.snapshot_type.as_str())
        .bind(mirror_key.clone());

        self.storage().batch_async(vec![bump_counter, insert]).await?;

        let snapshot = self
            .get_snapshot(&id)
            .await?
            .ok_or_else(|| TabulaError::StorageFailure(format!("Snapshot '{}' vanished after insert", id)))?;
        log::info!(
            "✓ Snapshot v{} ({}) captured: {} tables",
            snapshot.version,
            snapshot.snapshot_type,
            snapshot.tables.len()
        );

        self.mirror_in_background(&snapshot)?;
        Ok(snapshot)
    }

    /// Newest first.
    pub async fn get_snapshots(&self, limit: u32, offset: u64) -> Result<SnapshotPage> {
        let total = self
            .storage()
            .first_async(Statement::new("SELECT COUNT(*) AS n FROM schema_snapshots"))
            .await?
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0)
            .max(0) as u64;

        let rows = self
            .storage()
            .all_async(
                Statement::new(
                    "SELECT * FROM schema_snapshots ORDER BY version DESC LIMIT ? OFFSET ?",
                )
                .bind(i64::from(limit))
                .bind(offset),
            )
            .await?;

        Ok(SnapshotPage {
            snapshots: rows.iter().map(snapshot_from_row).collect::<Result<_>>()?,
            total,
        })
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Option<SchemaSnapshot>> {
        let row = self
            .storage()
            .first_async(Statement::new("SELECT * FROM schema_snapshots WHERE id = ?").bind(id))
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn require_snapshot(&self, id: &str) -> Result<SchemaSnapshot> {
        self.get_snapshot(id)
            .await?
            .ok_or_else(|| TabulaError::NotFound(format!("Snapshot '{}' not found", id)))
    }

    /// Replace the live user schema with the snapshot's.
    ///
    /// Destructive: every captured table is dropped and recreated empty,
    /// and user tables absent from the snapshot are dropped. All rows in
    /// those tables are lost. The whole restore is one batch.
    pub async fn restore_snapshot(&self, id: &str) -> Result<RestoreReport> {
        log::info!("🔧 RESTORE SNAPSHOT request: {}", id);
        let snapshot = self.require_snapshot(id).await?;
        for table in &snapshot.tables {
            self.validate_captured(table)?;
        }

        self.capture_pre_change(&format!("restore snapshot v{}", snapshot.version))
            .await?;

        let current = self.catalog.get_user_tables().await?;
        let captured: Vec<&str> = snapshot.table_names();
        let dropped: Vec<String> = current
            .iter()
            .map(|t| t.name.clone())
            .filter(|name| !captured.iter().any(|c| c.eq_ignore_ascii_case(name)))
            .collect();

        let mut statements = Vec::new();
        for name in &dropped {
            statements.push(Statement::new(DdlGenerator::drop_table_if_exists(name)));
        }
        statements.push(system_schema::clear_table_metadata());
        for table in &snapshot.tables {
            statements.push(Statement::new(DdlGenerator::drop_table_if_exists(&table.name)));
            statements.push(Statement::new(table.sql.clone()));
            for index in &table.indexes {
                statements.push(Statement::new(index.clone()));
            }
            statements.push(system_schema::upsert_table_metadata(
                &table.name,
                table.access_policy,
                table.owner_column.as_deref(),
            ));
        }

        self.storage().batch_async(statements).await?;
        for table in current.iter() {
            self.catalog.forget_row_count(&table.name);
        }

        let restored: Vec<String> = snapshot.tables.iter().map(|t| t.name.clone()).collect();
        log::info!(
            "✓ Snapshot v{} restored: {} tables recreated, {} dropped",
            snapshot.version,
            restored.len(),
            dropped.len()
        );
        Ok(RestoreReport {
            snapshot_id: snapshot.id,
            version: snapshot.version,
            restored,
            dropped,
        })
    }

    /// Remove the snapshot row (and, in the background, its mirror copy).
    /// Live schema is untouched.
    pub async fn delete_snapshot(&self, id: &str) -> Result<()> {
        let snapshot = self.require_snapshot(id).await?;
        let result = self
            .storage()
            .run_async(Statement::new("DELETE FROM schema_snapshots WHERE id = ?").bind(id))
            .await?;
        if result.changes == 0 {
            return Err(TabulaError::NotFound(format!("Snapshot '{}' not found", id)));
        }

        if let (Some(mirror), Some(key)) = (self.mirror.clone(), snapshot.mirror_key) {
            self.background.defer(
                "snapshot_mirror_delete",
                Box::pin(async move { mirror.delete(&key).await.map_err(|e| e.to_string()) }),
            );
        }
        log::info!("✓ Snapshot v{} deleted", snapshot.version);
        Ok(())
    }

    pub async fn compare_snapshots(&self, from_id: &str, to_id: &str) -> Result<SnapshotComparison> {
        let from = self.require_snapshot(from_id).await?;
        let to = self.require_snapshot(to_id).await?;
        Ok(compare(&from, &to))
    }

    /// Read the mirrored copy of a snapshot, if mirroring is configured and
    /// the object exists.
    pub async fn fetch_mirrored_snapshot(&self, id: &str) -> Result<Option<SchemaSnapshot>> {
        let Some(mirror) = &self.mirror else {
            return Err(TabulaError::Config(
                "Snapshot mirroring is not configured".to_string(),
            ));
        };
        let key = match self.get_snapshot(id).await? {
            Some(SchemaSnapshot {
                mirror_key: Some(key),
                ..
            }) => key,
            _ => self.mirror_key(id),
        };

        match mirror.get(&key).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn mirror_key(&self, id: &str) -> String {
        let prefix = self.mirror_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}.json", id)
        } else {
            format!("{}/{}.json", prefix, id)
        }
    }

    fn mirror_in_background(&self, snapshot: &SchemaSnapshot) -> Result<()> {
        let (Some(mirror), Some(key)) = (self.mirror.clone(), snapshot.mirror_key.clone()) else {
            return Ok(());
        };
        let body = serde_json::to_string(snapshot)?;
        self.background.defer(
            "snapshot_mirror_put",
            Box::pin(async move { mirror.put(&key, body).await.map_err(|e| e.to_string()) }),
        );
        Ok(())
    }

    async fn capture_tables(&self) -> Result<Vec<SnapshotTable>> {
        let mut tables = Vec::new();
        for table in self.catalog.get_user_tables().await? {
            let indexes = self
                .catalog
                .get_table_indexes(&table.name)
                .await?
                .into_iter()
                .filter_map(|ix| ix.sql)
                .collect();
            tables.push(SnapshotTable {
                owner_column: table.owner_column.clone(),
                access_policy: table.access_policy,
                name: table.name,
                sql: table.sql,
                indexes,
            });
        }
        Ok(tables)
    }

    /// Captured text is replayed verbatim, so only plain table and index
    /// definitions for unprotected names are accepted.
    fn validate_captured(&self, table: &SnapshotTable) -> Result<()> {
        self.validator.ensure_user_table(&table.name, "RESTORE SNAPSHOT")?;
        if !starts_with_keywords(&table.sql, &["CREATE", "TABLE"]) {
            return Err(TabulaError::invalid_input(format!(
                "Snapshot definition of '{}' is not a CREATE TABLE statement",
                table.name
            )));
        }
        for index in &table.indexes {
            let is_index = starts_with_keywords(index, &["CREATE", "INDEX"])
                || starts_with_keywords(index, &["CREATE", "UNIQUE", "INDEX"]);
            if !is_index {
                return Err(TabulaError::invalid_input(format!(
                    "Snapshot index on '{}' is not a CREATE INDEX statement",
                    table.name
                )));
            }
        }
        if table.access_policy == AccessPolicy::System {
            return Err(TabulaError::invalid_input(format!(
                "Snapshot table '{}' carries the system policy",
                table.name
            )));
        }
        Ok(())
    }
}

fn starts_with_keywords(sql: &str, keywords: &[&str]) -> bool {
    let mut words = sql.split_whitespace();
    keywords
        .iter()
        .all(|kw| words.next().is_some_and(|w| w.eq_ignore_ascii_case(kw)))
}

fn render_full_schema(tables: &[SnapshotTable]) -> String {
    tables
        .iter()
        .flat_map(|t| std::iter::once(&t.sql).chain(t.indexes.iter()))
        .map(|sql| format!("{};", sql))
        .collect::<Vec<_>>()
        .join("\n")
}

fn snapshot_from_row(row: &Row) -> Result<SchemaSnapshot> {
    let corrupt = |field: &str| {
        TabulaError::StorageFailure(format!("Snapshot row has invalid {}", field))
    };

    let tables: Vec<SnapshotTable> =
        serde_json::from_str(row.get_str("tables_json").ok_or_else(|| corrupt("tables_json"))?)?;
    let created_at = row
        .get_str("created_at")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| corrupt("created_at"))?;
    let snapshot_type = row
        .get_str("snapshot_type")
        .and_then(SnapshotType::from_str)
        .ok_or_else(|| corrupt("snapshot_type"))?;

    Ok(SchemaSnapshot {
        id: row.get_string("id").ok_or_else(|| corrupt("id"))?,
        version: row.get_i64("version").ok_or_else(|| corrupt("version"))?,
        name: row.get_string("name"),
        description: row.get_string("description"),
        full_schema: row.get_string("full_schema").unwrap_or_default(),
        tables,
        content_hash: row.get_string("content_hash").unwrap_or_default(),
        created_at,
        created_by: row.get_string("created_by"),
        snapshot_type,
        mirror_key: row.get_string("mirror_key"),
    })
}
