//! Pre-flight checks for destructive column changes.
//!
//! Every probe is a read-only COUNT over the live table. A non-zero count
//! turns into a human-readable error naming it; the modify path refuses to
//! continue when any probe fails.

use std::sync::Arc;

use tabula_commons::{
    quote_ident, validate_identifier, ColumnChangeRequest, ColumnDescriptor, DataType,
    ForeignKeyChange, ForeignKeyTarget, IdentifierKind, TypeAffinity, ValidationResult,
};
use tabula_store::{SqlStorage, SqlStorageAsync, Statement};

use crate::catalog::SchemaCatalog;
use crate::error::{Result, TabulaError};

pub struct ColumnChangeValidator {
    catalog: Arc<SchemaCatalog>,
}

impl ColumnChangeValidator {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    fn storage(&self) -> &Arc<dyn SqlStorage> {
        self.catalog.storage()
    }

    /// Run every probe the request calls for.
    ///
    /// `NotFound` when the table or column does not exist; otherwise the
    /// outcome is carried in the returned `ValidationResult`.
    pub async fn validate(
        &self,
        table: &str,
        column: &str,
        changes: &ColumnChangeRequest,
    ) -> Result<ValidationResult> {
        let columns = self.catalog.get_table_columns(table).await?;
        let current = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .ok_or_else(|| TabulaError::column_not_found(table, column))?;

        let mut result = ValidationResult::ok();

        if changes.nullable == Some(false) && current.nullable {
            self.check_not_null(table, current, &mut result).await?;
        }

        if let Some(ForeignKeyChange::Add { references }) = &changes.foreign_key {
            self.check_foreign_key(table, current, references, &mut result)
                .await?;
        }

        if let Some(new_type) = &changes.data_type {
            if new_type != &current.data_type {
                self.check_type_conversion(table, current, new_type, &mut result)
                    .await?;
            }
        }

        if result.valid {
            log::debug!("✓ Column change on {}.{} passed validation", table, column);
        } else {
            log::debug!(
                "Column change on {}.{} rejected: {:?}",
                table,
                column,
                result.errors
            );
        }
        Ok(result)
    }

    async fn check_not_null(
        &self,
        table: &str,
        column: &ColumnDescriptor,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let nulls = self
            .count(format!(
                "SELECT COUNT(*) AS n FROM {} WHERE {} IS NULL",
                quote_ident(table),
                quote_ident(&column.name)
            ))
            .await?;
        if nulls > 0 {
            result.fail(
                format!(
                    "Cannot set NOT NULL on '{}': {} rows contain NULL",
                    column.name, nulls
                ),
                nulls,
            );
        }
        Ok(())
    }

    async fn check_foreign_key(
        &self,
        table: &str,
        column: &ColumnDescriptor,
        target: &ForeignKeyTarget,
        result: &mut ValidationResult,
    ) -> Result<()> {
        validate_identifier(IdentifierKind::Table, &target.table)?;
        validate_identifier(IdentifierKind::Column, &target.column)?;

        let referenced = match self.catalog.get_table_columns(&target.table).await {
            Ok(columns) => columns,
            Err(TabulaError::NotFound(_)) => {
                result.fail(
                    format!("Referenced table '{}' does not exist", target.table),
                    0,
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !referenced
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&target.column))
        {
            result.fail(
                format!(
                    "Referenced column '{}' does not exist in '{}'",
                    target.column, target.table
                ),
                0,
            );
            return Ok(());
        }

        let orphans = self
            .count(format!(
                "SELECT COUNT(*) AS n FROM {src} s WHERE s.{col} IS NOT NULL \
                 AND NOT EXISTS (SELECT 1 FROM {dst} r WHERE r.{dst_col} = s.{col})",
                src = quote_ident(table),
                col = quote_ident(&column.name),
                dst = quote_ident(&target.table),
                dst_col = quote_ident(&target.column),
            ))
            .await?;
        if orphans > 0 {
            result.fail(
                format!(
                    "Cannot add foreign key on '{}': {} rows reference missing {}.{}",
                    column.name, orphans, target.table, target.column
                ),
                orphans,
            );
        }
        Ok(())
    }

    /// Best-effort count of values that would not survive the new type.
    async fn check_type_conversion(
        &self,
        table: &str,
        column: &ColumnDescriptor,
        new_type: &DataType,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let Some(compatible) = compatible_predicate(new_type.affinity(), &quote_ident(&column.name))
        else {
            return Ok(());
        };

        let bad = self
            .count(format!(
                "SELECT COUNT(*) AS n FROM {} WHERE {} IS NOT NULL AND NOT ({})",
                quote_ident(table),
                quote_ident(&column.name),
                compatible
            ))
            .await?;
        if bad > 0 {
            result.fail(
                format!(
                    "Cannot convert '{}' to {}: {} rows hold incompatible values",
                    column.name, new_type, bad
                ),
                bad,
            );
        }
        Ok(())
    }

    async fn count(&self, sql: String) -> Result<u64> {
        let row = self.storage().first_async(Statement::new(sql)).await?;
        Ok(row.and_then(|r| r.get_i64("n")).unwrap_or(0).max(0) as u64)
    }
}

/// SQL predicate that holds for values safely representable under the
/// target affinity. `None` when every value converts (TEXT, BLOB).
fn compatible_predicate(affinity: TypeAffinity, col: &str) -> Option<String> {
    match affinity {
        TypeAffinity::Integer => Some(format!(
            "typeof({c}) = 'integer' \
             OR (typeof({c}) = 'real' AND {c} = CAST({c} AS INTEGER)) \
             OR (typeof({c}) = 'text' AND trim({c}) GLOB '[0-9]*' \
                 AND trim({c}) NOT GLOB '*[^0-9]*') \
             OR (typeof({c}) = 'text' AND trim({c}) GLOB '[-+][0-9]*' \
                 AND substr(trim({c}), 2) NOT GLOB '*[^0-9]*')",
            c = col
        )),
        TypeAffinity::Real | TypeAffinity::Numeric => Some(format!(
            "typeof({c}) IN ('integer', 'real') \
             OR (typeof({c}) = 'text' AND trim({c}) GLOB '*[0-9]*' \
                 AND trim({c}) NOT GLOB '*[^0-9.eE+-]*')",
            c = col
        )),
        TypeAffinity::Boolean => Some(format!(
            "{c} IN (0, 1) OR lower({c}) IN ('0', '1', 'true', 'false')",
            c = col
        )),
        TypeAffinity::Text | TypeAffinity::Blob => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestCore;
    use serde_json::json;
    use tabula_commons::{ColumnSpec, CreateTableOptions};

    async fn setup() -> TestCore {
        let core = TestCore::new().await;
        core.ctx
            .schema()
            .create_table(
                "readings",
                vec![
                    ColumnSpec::new("label", DataType::Text),
                    ColumnSpec::new("value", DataType::Text),
                ],
                CreateTableOptions::default(),
            )
            .await
            .unwrap();
        for (label, value) in [(json!("a"), json!("12")), (json!(null), json!("1.5")), (json!("c"), json!("abc"))] {
            let mut data = serde_json::Map::new();
            data.insert("label".into(), label);
            data.insert("value".into(), value);
            core.ctx
                .access()
                .create_record("readings", data)
                .await
                .unwrap();
        }
        core
    }

    #[tokio::test]
    async fn test_not_null_counts_nulls() {
        let core = setup().await;
        let result = core
            .ctx
            .validator()
            .validate("readings", "label", &ColumnChangeRequest::default().with_nullable(false))
            .await
            .unwrap();
        assert!(!result.valid);
        assert_eq!(result.conflicting_rows, 1);
        assert!(result.errors[0].contains("1 rows contain NULL"));
    }

    #[tokio::test]
    async fn test_type_narrowing_heuristics() {
        let core = setup().await;
        let validator = core.ctx.validator();

        let to_int = validator
            .validate("readings", "value", &ColumnChangeRequest::default().with_type(DataType::Integer))
            .await
            .unwrap();
        assert_eq!(to_int.conflicting_rows, 2);

        let to_real = validator
            .validate("readings", "value", &ColumnChangeRequest::default().with_type(DataType::Real))
            .await
            .unwrap();
        assert_eq!(to_real.conflicting_rows, 1);

        let to_text = validator
            .validate("readings", "label", &ColumnChangeRequest::default().with_type(DataType::Blob))
            .await
            .unwrap();
        assert!(to_text.valid);
    }

    #[tokio::test]
    async fn test_foreign_key_orphans() {
        let core = setup().await;
        core.ctx
            .schema()
            .create_table(
                "labels",
                vec![ColumnSpec::new("code", DataType::Text).unique()],
                CreateTableOptions::default(),
            )
            .await
            .unwrap();

        let mut data = serde_json::Map::new();
        data.insert("code".into(), json!("a"));
        core.ctx
            .access()
            .create_record("labels", data)
            .await
            .unwrap();

        let result = core
            .ctx
            .validator()
            .validate(
                "readings",
                "label",
                &ColumnChangeRequest::default().add_foreign_key("labels", "code"),
            )
            .await
            .unwrap();
        // "c" has no match; NULL is ignored
        assert_eq!(result.conflicting_rows, 1);

        let missing = core
            .ctx
            .validator()
            .validate(
                "readings",
                "label",
                &ColumnChangeRequest::default().add_foreign_key("nowhere", "id"),
            )
            .await
            .unwrap();
        assert!(!missing.valid);
        assert!(missing.errors[0].contains("does not exist"));
    }

    #[tokio::test]
    async fn test_unknown_column() {
        let core = setup().await;
        let err = core
            .ctx
            .validator()
            .validate("readings", "ghost", &ColumnChangeRequest::default().with_nullable(false))
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::NotFound(_)));
    }
}
