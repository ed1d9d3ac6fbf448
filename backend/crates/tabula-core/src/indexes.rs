//! Index management for user tables.

use std::sync::Arc;

use tabula_commons::IndexDescriptor;
use tabula_store::{SqlStorageAsync, Statement};

use crate::catalog::SchemaCatalog;
use crate::ddl::{DdlGenerator, NameValidator};
use crate::error::{Result, TabulaError};

pub struct IndexManager {
    catalog: Arc<SchemaCatalog>,
    validator: NameValidator,
}

impl IndexManager {
    pub fn new(catalog: Arc<SchemaCatalog>, validator: NameValidator) -> Self {
        Self { catalog, validator }
    }

    pub async fn get_table_indexes(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        self.catalog.require_table(table).await?;
        self.catalog.get_table_indexes(table).await
    }

    pub async fn get_all_user_indexes(&self) -> Result<Vec<IndexDescriptor>> {
        self.catalog.get_all_user_indexes().await
    }

    pub async fn create_index(
        &self,
        name: &str,
        table: &str,
        columns: Vec<String>,
        unique: bool,
    ) -> Result<IndexDescriptor> {
        log::info!(
            "🔧 CREATE INDEX request: {} ON {} ({})",
            name,
            table,
            columns.join(", ")
        );
        self.validator.ensure_user_table(table, "CREATE INDEX")?;
        self.validator.validate_index_name(name)?;
        if columns.is_empty() {
            return Err(TabulaError::invalid_input("An index needs at least one column"));
        }

        let existing = self.catalog.get_table_columns(table).await?;
        let mut resolved = Vec::with_capacity(columns.len());
        for column in &columns {
            self.validator.validate_column_name(column)?;
            let descriptor = existing
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(column))
                .ok_or_else(|| TabulaError::column_not_found(table, column))?;
            resolved.push(descriptor.name.clone());
        }

        if self.index_exists(name).await? {
            log::warn!("⚠️  Index '{}' already exists", name);
            return Err(TabulaError::DuplicateName(format!(
                "Index '{}' already exists",
                name
            )));
        }

        let sql = DdlGenerator::create_index(name, table, &resolved, unique);
        self.catalog.storage().run_async(Statement::new(sql.clone())).await?;
        log::info!("✓ Index {} created on {}", name, table);

        Ok(IndexDescriptor {
            name: name.to_string(),
            table: table.to_string(),
            columns: resolved,
            unique,
            sql: Some(sql),
        })
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        log::info!("🔧 DROP INDEX request: {}", name);
        self.validator.validate_index_name(name)?;

        let row = self
            .catalog
            .storage()
            .first_async(
                Statement::new(
                    "SELECT tbl_name, sql FROM sqlite_master WHERE type = 'index' AND name = ? COLLATE NOCASE",
                )
                .bind(name),
            )
            .await?
            .ok_or_else(|| TabulaError::NotFound(format!("Index '{}' not found", name)))?;

        let table = row.get_string("tbl_name").unwrap_or_default();
        self.validator.ensure_user_table(&table, "DROP INDEX")?;
        if row.get_str("sql").is_none() {
            return Err(TabulaError::invalid_input(format!(
                "Index '{}' backs a table constraint and cannot be dropped",
                name
            )));
        }

        self.catalog
            .storage()
            .run_async(Statement::new(DdlGenerator::drop_index(name)))
            .await?;
        log::info!("✓ Index {} dropped", name);
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let row = self
            .catalog
            .storage()
            .first_async(
                Statement::new(
                    "SELECT 1 AS present FROM sqlite_master WHERE type = 'index' AND name = ? COLLATE NOCASE",
                )
                .bind(name),
            )
            .await?;
        Ok(row.is_some())
    }
}
