//! Schema catalog
//!
//! Reads live table, column, foreign-key and index metadata from the storage
//! engine's reflection views (`sqlite_master`, `pragma_table_info`,
//! `pragma_foreign_key_list`, `pragma_index_list`, `pragma_index_info`) and
//! joins in the per-table access policy from `table_metadata`.
//!
//! Row counts shown by `get_tables` come from a cache that is refreshed in
//! the background after each listing, so the listing itself never scans a
//! table.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tabula_commons::{
    quote_ident, AccessPolicy, ColumnDefault, ColumnDescriptor, DataType, ForeignKeyDescriptor,
    IndexDescriptor, ProtectedTables, SystemTable, TableDescriptor, TableKind,
};
use tabula_store::{BackgroundTasks, SqlStorage, SqlStorageAsync, Statement};

use crate::error::{Result, TabulaError};

/// Columns, foreign keys and indexes of one table, read together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableShape {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn foreign_keys_on(&self, column: &str) -> impl Iterator<Item = &ForeignKeyDescriptor> {
        let column = column.to_string();
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.column.eq_ignore_ascii_case(&column))
    }

    pub fn indexes_on(&self, column: &str) -> impl Iterator<Item = &IndexDescriptor> {
        let column = column.to_string();
        self.indexes
            .iter()
            .filter(move |ix| ix.columns.iter().any(|c| c.eq_ignore_ascii_case(&column)))
    }
}

/// Access policy and owner column recorded for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePolicy {
    pub access_policy: AccessPolicy,
    pub owner_column: String,
}

pub struct SchemaCatalog {
    storage: Arc<dyn SqlStorage>,
    protected: ProtectedTables,
    default_owner_column: String,
    row_counts: Arc<DashMap<String, u64>>,
    background: Arc<dyn BackgroundTasks>,
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("protected", &self.protected)
            .field("default_owner_column", &self.default_owner_column)
            .field("cached_row_counts", &self.row_counts.len())
            .finish()
    }
}

impl SchemaCatalog {
    pub fn new(
        storage: Arc<dyn SqlStorage>,
        protected: ProtectedTables,
        default_owner_column: impl Into<String>,
        background: Arc<dyn BackgroundTasks>,
    ) -> Self {
        Self {
            storage,
            protected,
            default_owner_column: default_owner_column.into(),
            row_counts: Arc::new(DashMap::new()),
            background,
        }
    }

    pub fn storage(&self) -> &Arc<dyn SqlStorage> {
        &self.storage
    }

    pub fn protected_tables(&self) -> &ProtectedTables {
        &self.protected
    }

    pub fn default_owner_column(&self) -> &str {
        &self.default_owner_column
    }

    /// Every table in the database, system tables included.
    ///
    /// Row counts are the last cached values; a refresh is scheduled on the
    /// background port each call.
    pub async fn get_tables(&self) -> Result<Vec<TableDescriptor>> {
        let tables = self.list_tables(None).await?;
        self.schedule_row_count_refresh(tables.iter().map(|t| t.name.clone()).collect());
        Ok(tables)
    }

    /// Tables not in the protected set.
    pub async fn get_user_tables(&self) -> Result<Vec<TableDescriptor>> {
        Ok(self
            .list_tables(None)
            .await?
            .into_iter()
            .filter(|t| t.kind == TableKind::User)
            .collect())
    }

    pub async fn get_table(&self, table: &str) -> Result<Option<TableDescriptor>> {
        Ok(self.list_tables(Some(table)).await?.into_iter().next())
    }

    async fn list_tables(&self, only: Option<&str>) -> Result<Vec<TableDescriptor>> {
        let filter = if only.is_some() {
            " AND m.name = ? COLLATE NOCASE"
        } else {
            ""
        };
        let sql = format!(
            "SELECT m.name AS name, m.sql AS sql, t.access_policy AS access_policy, \
             t.owner_column AS owner_column \
             FROM sqlite_master m LEFT JOIN {} t ON t.table_name = m.name \
             WHERE m.type = 'table'{} ORDER BY m.name",
            SystemTable::TableMetadata.table_name(),
            filter
        );
        let mut statement = Statement::new(sql);
        if let Some(name) = only {
            statement = statement.bind(name);
        }
        let rows = self.storage.all_async(statement).await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get_string("name")?;
                let kind = if self.protected.is_protected(&name) {
                    TableKind::System
                } else {
                    TableKind::User
                };
                let (access_policy, owner_column) = self.resolve_policy(
                    &name,
                    row.get_str("access_policy"),
                    row.get_str("owner_column"),
                );
                Some(TableDescriptor {
                    row_count: self.row_counts.get(&name).map(|c| *c),
                    sql: row.get_string("sql").unwrap_or_default(),
                    owner_column: (access_policy == AccessPolicy::Private).then_some(owner_column),
                    name,
                    kind,
                    access_policy,
                })
            })
            .collect())
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = self
            .storage
            .first_async(
                Statement::new(
                    "SELECT 1 AS present FROM sqlite_master \
                     WHERE type = 'table' AND name = ? COLLATE NOCASE",
                )
                .bind(table),
            )
            .await?;
        Ok(row.is_some())
    }

    pub async fn require_table(&self, table: &str) -> Result<()> {
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(TabulaError::table_not_found(table))
        }
    }

    /// Columns in ordinal order; `NotFound` when the table does not exist.
    pub async fn get_table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows = self
            .storage
            .all_async(
                Statement::new(
                    "SELECT cid, name, type, \"notnull\" AS not_null, dflt_value, pk \
                     FROM pragma_table_info(?) ORDER BY cid",
                )
                .bind(table),
            )
            .await?;
        if rows.is_empty() {
            return Err(TabulaError::table_not_found(table));
        }

        let unique_columns = self.single_column_unique_constraints(table).await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get_string("name")?;
                Some(ColumnDescriptor {
                    ordinal: row.get_i64("cid").unwrap_or(0) as u32,
                    data_type: DataType::parse(row.get_str("type").unwrap_or("")),
                    nullable: !row.get_bool("not_null"),
                    default_value: ColumnDefault::from_reflection(row.get_str("dflt_value")),
                    primary_key: row.get_i64("pk").unwrap_or(0) > 0,
                    unique: unique_columns.contains(&name.to_ascii_lowercase()),
                    name,
                })
            })
            .collect())
    }

    pub async fn get_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        let rows = self
            .storage
            .all_async(
                Statement::new(
                    "SELECT \"from\" AS from_column, \"table\" AS referenced_table, \
                     \"to\" AS referenced_column \
                     FROM pragma_foreign_key_list(?) ORDER BY id, seq",
                )
                .bind(table),
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ForeignKeyDescriptor {
                    column: row.get_string("from_column")?,
                    referenced_table: row.get_string("referenced_table")?,
                    referenced_column: row.get_string("referenced_column").unwrap_or_default(),
                })
            })
            .collect())
    }

    /// Indexes on a table, excluding the primary-key index.
    ///
    /// Indexes backing a UNIQUE constraint are included with `sql: None`.
    pub async fn get_table_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        let rows = self
            .storage
            .all_async(
                Statement::new(
                    "SELECT il.name AS index_name, il.\"unique\" AS is_unique, \
                     ii.name AS column_name, m.sql AS sql \
                     FROM pragma_index_list(?) il \
                     JOIN pragma_index_info(il.name) ii \
                     LEFT JOIN sqlite_master m ON m.type = 'index' AND m.name = il.name \
                     WHERE il.origin != 'pk' \
                     ORDER BY il.name, ii.seqno",
                )
                .bind(table),
            )
            .await?;

        let mut indexes: Vec<IndexDescriptor> = Vec::new();
        let mut expression_indexes: HashSet<String> = HashSet::new();
        for row in &rows {
            let Some(name) = row.get_string("index_name") else {
                continue;
            };
            // Expression indexes report no column name
            let Some(column) = row.get_string("column_name") else {
                expression_indexes.insert(name);
                continue;
            };
            match indexes.last_mut() {
                Some(current) if current.name == name => current.columns.push(column),
                _ => indexes.push(IndexDescriptor {
                    table: table.to_string(),
                    columns: vec![column],
                    unique: row.get_bool("is_unique"),
                    sql: row.get_string("sql"),
                    name,
                }),
            }
        }
        indexes.retain(|ix| !expression_indexes.contains(&ix.name));
        Ok(indexes)
    }

    /// Explicitly created indexes on every user table.
    pub async fn get_all_user_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        let rows = self
            .storage
            .all_async(Statement::new(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            ))
            .await?;

        let mut indexes = Vec::new();
        for name in rows.iter().filter_map(|r| r.get_string("name")) {
            if self.protected.is_protected(&name) {
                continue;
            }
            indexes.extend(
                self.get_table_indexes(&name)
                    .await?
                    .into_iter()
                    .filter(|ix| ix.sql.is_some()),
            );
        }
        Ok(indexes)
    }

    /// Columns, foreign keys and indexes in one call.
    pub async fn table_shape(&self, table: &str) -> Result<TableShape> {
        let columns = self.get_table_columns(table).await?;
        let foreign_keys = self.get_foreign_keys(table).await?;
        let indexes = self.get_table_indexes(table).await?;
        Ok(TableShape {
            table: table.to_string(),
            columns,
            foreign_keys,
            indexes,
        })
    }

    /// Policy and owner column for a table (protected tables are `System`).
    pub async fn table_policy(&self, table: &str) -> Result<TablePolicy> {
        let row = self
            .storage
            .first_async(
                Statement::new(format!(
                    "SELECT access_policy, owner_column FROM {} WHERE table_name = ? COLLATE NOCASE",
                    SystemTable::TableMetadata.table_name()
                ))
                .bind(table),
            )
            .await?;

        let (access_policy, owner_column) = self.resolve_policy(
            table,
            row.as_ref().and_then(|r| r.get_str("access_policy")),
            row.as_ref().and_then(|r| r.get_str("owner_column")),
        );
        Ok(TablePolicy {
            access_policy,
            owner_column,
        })
    }

    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        let count = count_rows(&self.storage, table).await?;
        self.row_counts.insert(table.to_string(), count);
        Ok(count)
    }

    /// Drop the cached row count (after the table is dropped or replaced).
    pub fn forget_row_count(&self, table: &str) {
        self.row_counts.remove(table);
    }

    fn resolve_policy(
        &self,
        table: &str,
        policy: Option<&str>,
        owner_column: Option<&str>,
    ) -> (AccessPolicy, String) {
        let owner_column = owner_column
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_owner_column)
            .to_string();
        if self.protected.is_protected(table) {
            return (AccessPolicy::System, owner_column);
        }
        let policy = policy
            .and_then(AccessPolicy::from_str)
            .unwrap_or(AccessPolicy::Public);
        (policy, owner_column)
    }

    async fn single_column_unique_constraints(&self, table: &str) -> Result<HashSet<String>> {
        Ok(self
            .get_table_indexes(table)
            .await?
            .into_iter()
            .filter(|ix| ix.unique && ix.sql.is_none() && ix.is_single_column())
            .flat_map(|ix| ix.columns)
            .map(|c| c.to_ascii_lowercase())
            .collect())
    }

    fn schedule_row_count_refresh(&self, tables: Vec<String>) {
        if tables.is_empty() {
            return;
        }
        let storage = self.storage.clone();
        let counts = self.row_counts.clone();
        self.background.defer(
            "row_count_refresh",
            Box::pin(async move {
                for table in tables {
                    match count_rows(&storage, &table).await {
                        Ok(count) => {
                            counts.insert(table, count);
                        }
                        // Table dropped since the listing
                        Err(_) => {
                            counts.remove(&table);
                        }
                    }
                }
                Ok(())
            }),
        );
    }
}

async fn count_rows(storage: &Arc<dyn SqlStorage>, table: &str) -> Result<u64> {
    let row = storage
        .first_async(Statement::new(format!(
            "SELECT COUNT(*) AS n FROM {}",
            quote_ident(table)
        )))
        .await?;
    Ok(row.and_then(|r| r.get_i64("n")).unwrap_or(0).max(0) as u64)
}
