//! Schema manager
//!
//! Entry point for structural changes to user tables. Every request is
//! name-checked before any statement text is built, destructive requests
//! take a `pre_change` snapshot first, and each change runs as one batch.

use std::collections::HashSet;
use std::sync::Arc;

use tabula_commons::{
    AccessPolicy, ColumnChangeRequest, ColumnDefault, ColumnSpec, CreateTableOptions, DataType,
    ForeignKeyChange, IdentifierKind, TableDescriptor, ValidationResult,
};
use tabula_store::{SqlStorageAsync, Statement};

use crate::catalog::{SchemaCatalog, TableShape};
use crate::ddl::{is_implicit_column, DdlGenerator, NameValidator};
use crate::error::{Result, TabulaError};
use crate::recreation::{AppliedChange, ColumnChange, ColumnChangeApplier};
use crate::snapshots::SnapshotStore;
use crate::system_schema;
use crate::validation::ColumnChangeValidator;

pub struct SchemaManager {
    catalog: Arc<SchemaCatalog>,
    validator: NameValidator,
    column_validator: Arc<ColumnChangeValidator>,
    applier: Arc<ColumnChangeApplier>,
    snapshots: Arc<SnapshotStore>,
}

impl SchemaManager {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        validator: NameValidator,
        column_validator: Arc<ColumnChangeValidator>,
        applier: Arc<ColumnChangeApplier>,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            catalog,
            validator,
            column_validator,
            applier,
            snapshots,
        }
    }

    /// Create a user table with the implicit `id`, `created_at` and
    /// `updated_at` columns. Private tables get their owner column added
    /// when the caller did not declare it.
    pub async fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnSpec>,
        options: CreateTableOptions,
    ) -> Result<TableDescriptor> {
        log::info!(
            "🔧 CREATE TABLE request: {} ({} columns, {})",
            name,
            columns.len(),
            options.access_policy.as_str()
        );
        self.validator.ensure_user_table(name, "CREATE TABLE")?;
        if options.access_policy == AccessPolicy::System {
            return Err(TabulaError::invalid_input(
                "User tables cannot use the system access policy",
            ));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for spec in &columns {
            self.validator.validate_column_spec(spec)?;
            if is_implicit_column(&spec.name) {
                return Err(TabulaError::invalid_input(format!(
                    "Column '{}' is managed automatically and cannot be declared",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.to_ascii_lowercase()) {
                return Err(TabulaError::invalid_input(format!(
                    "Column '{}' is declared more than once",
                    spec.name
                )));
            }
        }

        let mut columns = columns;
        let owner_column = match options.access_policy {
            AccessPolicy::Private => {
                let owner = options
                    .owner_column
                    .clone()
                    .unwrap_or_else(|| self.catalog.default_owner_column().to_string());
                self.validator.validate_column_name(&owner)?;
                if is_implicit_column(&owner) {
                    return Err(TabulaError::invalid_input(format!(
                        "Column '{}' cannot be used as the owner column",
                        owner
                    )));
                }
                if !seen.contains(&owner.to_ascii_lowercase()) {
                    columns.push(ColumnSpec::new(owner.clone(), DataType::Text));
                }
                Some(owner)
            }
            _ => None,
        };

        if self.catalog.table_exists(name).await? {
            log::warn!("⚠️  Table '{}' already exists", name);
            return Err(TabulaError::DuplicateName(format!(
                "Table '{}' already exists",
                name
            )));
        }

        let statements = vec![
            Statement::new(DdlGenerator::create_table(name, &columns)),
            system_schema::upsert_table_metadata(
                name,
                options.access_policy,
                owner_column.as_deref(),
            ),
        ];
        self.catalog.storage().batch_async(statements).await?;
        log::info!("✓ Table {} created", name);

        self.catalog
            .get_table(name)
            .await?
            .ok_or_else(|| TabulaError::table_not_found(name))
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        log::info!("🔧 DROP TABLE request: {}", name);
        self.validator.ensure_user_table(name, "DROP TABLE")?;
        self.catalog.require_table(name).await?;

        self.snapshots
            .capture_pre_change(&format!("DROP TABLE {}", name))
            .await?;

        let statements = vec![
            Statement::new(DdlGenerator::drop_table(name)),
            system_schema::delete_table_metadata(name),
        ];
        self.catalog.storage().batch_async(statements).await?;
        self.catalog.forget_row_count(name);
        log::info!("✓ Table {} dropped", name);
        Ok(())
    }

    /// Append a column in place. The new column must be valid for rows that
    /// already exist, so UNIQUE and NOT NULL without a default are refused.
    pub async fn add_column(&self, table: &str, spec: ColumnSpec) -> Result<()> {
        log::info!("🔧 ADD COLUMN request: {}.{}", table, spec.name);
        self.validator.ensure_user_table(table, "ADD COLUMN")?;
        self.validator.validate_column_spec(&spec)?;
        if is_implicit_column(&spec.name) {
            return Err(TabulaError::invalid_input(format!(
                "Column '{}' is managed automatically and cannot be declared",
                spec.name
            )));
        }
        if spec.unique {
            return Err(TabulaError::invalid_input(format!(
                "Column '{}' cannot be added with a UNIQUE constraint; create a unique index instead",
                spec.name
            )));
        }
        if !spec.nullable && spec.default_value == ColumnDefault::None {
            return Err(TabulaError::invalid_input(format!(
                "Column '{}' is NOT NULL and needs a default value",
                spec.name
            )));
        }

        let shape = self.catalog.table_shape(table).await?;
        if shape.has_column(&spec.name) {
            return Err(TabulaError::DuplicateName(format!(
                "Column '{}' already exists in table '{}'",
                spec.name, table
            )));
        }

        self.catalog
            .storage()
            .run_async(Statement::new(DdlGenerator::add_column(table, &spec)))
            .await?;
        log::info!("✓ Column {}.{} added", table, spec.name);
        Ok(())
    }

    pub async fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<AppliedChange> {
        log::info!("🔧 RENAME COLUMN request: {}.{} -> {}", table, from, to);
        self.validator.ensure_user_table(table, "RENAME COLUMN")?;
        self.validator.validate_column_name(from)?;
        self.validator.validate_column_name(to)?;
        if is_implicit_column(to) {
            return Err(TabulaError::invalid_input(format!(
                "Column name '{}' is reserved",
                to
            )));
        }

        let shape = self.editable_column(table, from).await?;
        if shape.has_column(to) {
            return Err(TabulaError::DuplicateName(format!(
                "Column '{}' already exists in table '{}'",
                to, table
            )));
        }

        let change = ColumnChange::Rename {
            from: from.to_string(),
            to: to.to_string(),
        };
        self.apply(&change, &shape).await
    }

    pub async fn drop_column(&self, table: &str, column: &str) -> Result<AppliedChange> {
        log::info!("🔧 DROP COLUMN request: {}.{}", table, column);
        self.validator.ensure_user_table(table, "DROP COLUMN")?;
        self.validator.validate_column_name(column)?;

        let shape = self.editable_column(table, column).await?;
        let change = ColumnChange::Drop {
            column: column.to_string(),
        };
        self.apply(&change, &shape).await
    }

    /// Change type, nullability or foreign key of a column.
    ///
    /// Validation runs first; a failed validation returns `ValidationFailed`
    /// and nothing is written.
    pub async fn modify_column(
        &self,
        table: &str,
        column: &str,
        changes: ColumnChangeRequest,
    ) -> Result<AppliedChange> {
        log::info!("🔧 MODIFY COLUMN request: {}.{} {:?}", table, column, changes);
        self.validator.ensure_user_table(table, "MODIFY COLUMN")?;
        self.validator.validate_column_name(column)?;
        self.check_change_request(&changes)?;

        let shape = self.editable_column(table, column).await?;
        let result = self.column_validator.validate(table, column, &changes).await?;
        if !result.valid {
            log::warn!(
                "❌ MODIFY COLUMN {}.{} rejected: {}",
                table,
                column,
                result.errors.join("; ")
            );
            return Err(result.into());
        }

        let change = ColumnChange::Modify {
            column: column.to_string(),
            changes,
        };
        self.apply(&change, &shape).await
    }

    /// Dry run of `modify_column`'s validation.
    pub async fn validate_column_changes(
        &self,
        table: &str,
        column: &str,
        changes: &ColumnChangeRequest,
    ) -> Result<ValidationResult> {
        self.validator.ensure_user_table(table, "VALIDATE COLUMN")?;
        self.validator.validate_column_name(column)?;
        self.check_change_request(changes)?;
        self.column_validator.validate(table, column, changes).await
    }

    fn check_change_request(&self, changes: &ColumnChangeRequest) -> Result<()> {
        if changes.is_empty() {
            return Err(TabulaError::invalid_input("No column changes requested"));
        }
        if let Some(data_type) = &changes.data_type {
            self.validator.validate_data_type(data_type)?;
        }
        if let Some(ForeignKeyChange::Add { references }) = &changes.foreign_key {
            tabula_commons::validate_identifier(IdentifierKind::Table, &references.table)?;
            tabula_commons::validate_identifier(IdentifierKind::Column, &references.column)?;
        }
        Ok(())
    }

    /// Shape of `table`, after checking that `column` exists and is neither
    /// implicit nor the table's owner column.
    async fn editable_column(&self, table: &str, column: &str) -> Result<TableShape> {
        if is_implicit_column(column) {
            return Err(TabulaError::invalid_input(format!(
                "Column '{}' is managed automatically and cannot be changed",
                column
            )));
        }
        let shape = self.catalog.table_shape(table).await?;
        if !shape.has_column(column) {
            return Err(TabulaError::column_not_found(table, column));
        }

        let policy = self.catalog.table_policy(table).await?;
        if policy.access_policy == AccessPolicy::Private
            && policy.owner_column.eq_ignore_ascii_case(column)
        {
            return Err(TabulaError::invalid_input(format!(
                "Column '{}' is the owner column of private table '{}'",
                column, table
            )));
        }
        Ok(shape)
    }

    async fn apply(&self, change: &ColumnChange, shape: &TableShape) -> Result<AppliedChange> {
        self.snapshots
            .capture_pre_change(&format!("{} ON {}", change.describe(), shape.table))
            .await?;
        let applied = self.applier.apply(change, shape).await?;
        self.catalog.forget_row_count(&shape.table);
        log::info!(
            "✓ {} on {} applied via {}",
            change.describe(),
            shape.table,
            applied.strategy
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestCore;
    use serde_json::json;
    use tabula_commons::{PageRequest, SnapshotType};

    #[tokio::test]
    async fn test_create_table_rejects_implicit_and_duplicates() {
        let core = TestCore::new().await;
        let schema = core.ctx.schema();

        let err = schema
            .create_table(
                "t",
                vec![ColumnSpec::new("id", DataType::Integer)],
                CreateTableOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));

        let err = schema
            .create_table(
                "t",
                vec![
                    ColumnSpec::new("a", DataType::Text),
                    ColumnSpec::new("A", DataType::Text),
                ],
                CreateTableOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));

        core.create_orders_table().await;
        let err = schema
            .create_table("Orders", vec![], CreateTableOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_private_table_owner_column() {
        let core = TestCore::new().await;
        let table = core
            .ctx
            .schema()
            .create_table(
                "docs",
                vec![ColumnSpec::new("title", DataType::Text)],
                CreateTableOptions::private_with_owner("author"),
            )
            .await
            .unwrap();
        assert_eq!(table.access_policy, AccessPolicy::Private);
        assert_eq!(table.owner_column.as_deref(), Some("author"));

        let columns = core.ctx.catalog().get_table_columns("docs").await.unwrap();
        assert!(columns.iter().any(|c| c.name == "author"));

        for result in [
            core.ctx.schema().drop_column("docs", "author").await,
            core.ctx.schema().rename_column("docs", "author", "writer").await,
            core.ctx.schema().drop_column("docs", "created_at").await,
        ] {
            assert!(matches!(result, Err(TabulaError::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_add_column_rules() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        let schema = core.ctx.schema();

        let err = schema
            .add_column("orders", ColumnSpec::new("code", DataType::Text).unique())
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));

        let err = schema
            .add_column("orders", ColumnSpec::new("qty", DataType::Integer).not_null())
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));

        schema
            .add_column(
                "orders",
                ColumnSpec::new("qty", DataType::Integer)
                    .not_null()
                    .with_default(ColumnDefault::Number("1".into())),
            )
            .await
            .unwrap();
        let err = schema
            .add_column("orders", ColumnSpec::new("QTY", DataType::Integer))
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn test_rename_and_drop_take_pre_change_snapshots() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        core.insert_order(7, "open").await;

        let schema = core.ctx.schema();
        schema.rename_column("orders", "status", "state").await.unwrap();
        schema.drop_column("orders", "state").await.unwrap();

        let columns = core.ctx.catalog().get_table_columns("orders").await.unwrap();
        let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "total", "created_at", "updated_at"]);

        let page = core.ctx.snapshots().get_snapshots(10, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(page
            .snapshots
            .iter()
            .all(|s| s.snapshot_type == SnapshotType::PreChange));

        let rows = core
            .ctx
            .access()
            .get_table_data("orders", &PageRequest::new(10, 0))
            .await
            .unwrap();
        assert_eq!(rows.data[0].get("total"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_drop_table_removes_metadata() {
        let core = TestCore::new().await;
        core.create_notes_table().await;
        core.ctx.schema().drop_table("notes").await.unwrap();

        assert!(core.ctx.catalog().get_table("notes").await.unwrap().is_none());
        let policy = core.ctx.catalog().table_policy("notes").await.unwrap();
        assert_eq!(policy.access_policy, AccessPolicy::Public);

        let err = core.ctx.schema().drop_table("notes").await.unwrap_err();
        assert!(matches!(err, TabulaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_modify_rejected_without_writes() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        core.insert_order(3, "open").await;
        core.ctx
            .access()
            .create_record("orders", serde_json::Map::new())
            .await
            .unwrap();

        let err = core
            .ctx
            .schema()
            .modify_column(
                "orders",
                "status",
                ColumnChangeRequest::default().with_nullable(false),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TabulaError::ValidationFailed { conflicting_rows: 1, .. }
        ));

        let page = core.ctx.snapshots().get_snapshots(10, 0).await.unwrap();
        assert_eq!(page.total, 0);
        let status = core
            .ctx
            .catalog()
            .get_table_columns("orders")
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "status")
            .unwrap();
        assert!(status.nullable);

        let err = core
            .ctx
            .schema()
            .modify_column("orders", "status", ColumnChangeRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));
    }
}
