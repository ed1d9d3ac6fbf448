//! Indexed-column search.
//!
//! Only columns covered by an explicit single-column index are searchable,
//! and each column type accepts a fixed operator set:
//!
//! | Affinity                 | Operators                         |
//! |--------------------------|-----------------------------------|
//! | INTEGER / REAL / NUMERIC | all                               |
//! | BOOLEAN                  | eq, ne, is_null, is_not_null      |
//! | TEXT                     | eq, is_null, is_not_null          |
//! | BLOB                     | is_null, is_not_null              |
//!
//! Ordering comparisons on TEXT are not exposed to avoid collation
//! ambiguity.

use std::sync::Arc;

use serde_json::Value;
use tabula_commons::{
    quote_ident, AccessContext, DataType, SearchOperator, SearchPredicate, SearchResult,
    SearchableColumn, TypeAffinity,
};
use tabula_configs::LimitsSettings;
use tabula_session::ReadScope;
use tabula_store::{SqlStorageAsync, SqlValue, Statement};

use crate::access::AccessControlGate;
use crate::catalog::SchemaCatalog;
use crate::error::{Result, TabulaError};

pub struct SearchIndexResolver {
    catalog: Arc<SchemaCatalog>,
    access: Arc<AccessControlGate>,
    limits: LimitsSettings,
}

impl SearchIndexResolver {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        access: Arc<AccessControlGate>,
        limits: LimitsSettings,
    ) -> Self {
        Self {
            catalog,
            access,
            limits,
        }
    }

    /// Columns covered by an explicit single-column index, in column order.
    pub async fn get_searchable_columns(&self, table: &str) -> Result<Vec<SearchableColumn>> {
        self.ensure_user_table(table)?;
        let columns = self.catalog.get_table_columns(table).await?;
        let indexes = self.catalog.get_table_indexes(table).await?;

        Ok(columns
            .into_iter()
            .filter(|column| {
                indexes.iter().any(|ix| {
                    ix.sql.is_some()
                        && ix.is_single_column()
                        && ix.columns[0].eq_ignore_ascii_case(&column.name)
                })
            })
            .map(|column| SearchableColumn {
                name: column.name,
                data_type: column.data_type,
            })
            .collect())
    }

    pub async fn search_records(
        &self,
        table: &str,
        predicates: &[SearchPredicate],
        offset: u64,
        limit: Option<u32>,
    ) -> Result<SearchResult> {
        self.search_scoped(table, predicates, offset, limit, &ReadScope::Unrestricted)
            .await
    }

    pub async fn search_records_with_access_control(
        &self,
        table: &str,
        predicates: &[SearchPredicate],
        offset: u64,
        limit: Option<u32>,
        ctx: &AccessContext,
    ) -> Result<SearchResult> {
        let scope = self.access.resolve_read(table, ctx).await?;
        self.search_scoped(table, predicates, offset, limit, &scope)
            .await
    }

    async fn search_scoped(
        &self,
        table: &str,
        predicates: &[SearchPredicate],
        offset: u64,
        limit: Option<u32>,
        scope: &ReadScope,
    ) -> Result<SearchResult> {
        let searchable = self.get_searchable_columns(table).await?;

        let mut conditions = Vec::with_capacity(predicates.len() + 1);
        let mut params = Vec::with_capacity(predicates.len() + 1);
        for predicate in predicates {
            let column = searchable
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&predicate.column))
                .ok_or_else(|| {
                    TabulaError::unsupported(format!(
                        "Column '{}' is not indexed and cannot be searched",
                        predicate.column
                    ))
                })?;
            let (condition, param) = build_condition(column, predicate)?;
            conditions.push(condition);
            params.extend(param);
        }

        let limit = self
            .limits
            .clamp_page_size(limit.unwrap_or(self.limits.default_page_size));

        match scope {
            ReadScope::Empty => {
                return Ok(SearchResult {
                    data: Vec::new(),
                    total: 0,
                    has_more: false,
                })
            }
            ReadScope::Unrestricted => {}
            ReadScope::OwnedBy {
                owner_column,
                caller_id,
            } => {
                conditions.push(format!("{} = ?", quote_ident(owner_column)));
                params.push(SqlValue::from(caller_id.as_str()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let storage = self.catalog.storage();
        let total = storage
            .first_async(
                Statement::new(format!(
                    "SELECT COUNT(*) AS n FROM {}{}",
                    quote_ident(table),
                    where_clause
                ))
                .bind_all(params.clone()),
            )
            .await?
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0)
            .max(0) as u64;

        let rows = storage
            .all_async(
                Statement::new(format!(
                    "SELECT * FROM {}{} ORDER BY rowid LIMIT ? OFFSET ?",
                    quote_ident(table),
                    where_clause
                ))
                .bind_all(params)
                .bind(i64::from(limit))
                .bind(offset),
            )
            .await?;

        let data: Vec<_> = rows.iter().map(|r| r.to_json_map()).collect();
        let has_more = offset + (data.len() as u64) < total;
        log::debug!(
            "Search on '{}' with {} predicates matched {} rows",
            table,
            predicates.len(),
            total
        );
        Ok(SearchResult {
            data,
            total,
            has_more,
        })
    }

    fn ensure_user_table(&self, table: &str) -> Result<()> {
        if self.catalog.protected_tables().is_protected(table) {
            return Err(TabulaError::SystemTableProtected(table.to_string()));
        }
        tabula_commons::validate_identifier(tabula_commons::IdentifierKind::Table, table)?;
        Ok(())
    }
}

/// Whether `operator` may be applied to a column of this type.
pub fn operator_allowed(data_type: &DataType, operator: SearchOperator) -> bool {
    use SearchOperator::*;
    match data_type.affinity() {
        TypeAffinity::Integer | TypeAffinity::Real | TypeAffinity::Numeric => true,
        TypeAffinity::Boolean => matches!(operator, Eq | Ne | IsNull | IsNotNull),
        TypeAffinity::Text => matches!(operator, Eq | IsNull | IsNotNull),
        TypeAffinity::Blob => matches!(operator, IsNull | IsNotNull),
    }
}

fn build_condition(
    column: &SearchableColumn,
    predicate: &SearchPredicate,
) -> Result<(String, Option<SqlValue>)> {
    if !operator_allowed(&column.data_type, predicate.operator) {
        return Err(TabulaError::unsupported(format!(
            "Operator '{}' is not supported on {} column '{}'",
            predicate.operator, column.data_type, column.name
        )));
    }

    let quoted = quote_ident(&column.name);
    let symbol = match predicate.operator {
        SearchOperator::IsNull => return Ok((format!("{} IS NULL", quoted), None)),
        SearchOperator::IsNotNull => return Ok((format!("{} IS NOT NULL", quoted), None)),
        SearchOperator::Eq => "=",
        SearchOperator::Ne => "!=",
        SearchOperator::Lt => "<",
        SearchOperator::Le => "<=",
        SearchOperator::Gt => ">",
        SearchOperator::Ge => ">=",
    };

    let value = match &predicate.value {
        None | Some(Value::Null) => {
            return Err(TabulaError::invalid_input(format!(
                "Operator '{}' on '{}' requires a value",
                predicate.operator, column.name
            )))
        }
        Some(value) => coerce_value(column, value)?,
    };
    Ok((format!("{} {} ?", quoted, symbol), Some(value)))
}

fn coerce_value(column: &SearchableColumn, value: &Value) -> Result<SqlValue> {
    let mismatch = || {
        TabulaError::invalid_input(format!(
            "Value {} does not match {} column '{}'",
            value, column.data_type, column.name
        ))
    };
    match column.data_type.affinity() {
        TypeAffinity::Integer | TypeAffinity::Real | TypeAffinity::Numeric => match value {
            Value::Number(_) => Ok(SqlValue::from_json(value)),
            Value::String(s) => {
                if let Ok(i) = s.trim().parse::<i64>() {
                    Ok(SqlValue::Integer(i))
                } else {
                    s.trim()
                        .parse::<f64>()
                        .map(SqlValue::Real)
                        .map_err(|_| mismatch())
                }
            }
            _ => Err(mismatch()),
        },
        TypeAffinity::Boolean => match value {
            Value::Bool(_) => Ok(SqlValue::from_json(value)),
            Value::Number(n) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => {
                Ok(SqlValue::from_json(value))
            }
            _ => Err(mismatch()),
        },
        TypeAffinity::Text => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
            _ => Err(mismatch()),
        },
        TypeAffinity::Blob => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestCore;
    use serde_json::json;

    #[test]
    fn test_operator_table() {
        assert!(!operator_allowed(&DataType::Text, SearchOperator::Gt));
        assert!(operator_allowed(&DataType::Text, SearchOperator::Eq));
        assert!(operator_allowed(&DataType::Integer, SearchOperator::Ge));
        assert!(operator_allowed(&DataType::Real, SearchOperator::Ne));
        assert!(!operator_allowed(&DataType::Boolean, SearchOperator::Lt));
        assert!(!operator_allowed(&DataType::Blob, SearchOperator::Eq));
        assert!(operator_allowed(&DataType::parse("VARCHAR(20)"), SearchOperator::IsNull));
        assert!(!operator_allowed(&DataType::parse("VARCHAR(20)"), SearchOperator::Lt));
    }

    #[tokio::test]
    async fn test_searchable_columns_need_single_column_index() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        let indexes = core.ctx.indexes();
        indexes
            .create_index("idx_status", "orders", vec!["status".into()], false)
            .await
            .unwrap();
        indexes
            .create_index("idx_pair", "orders", vec!["total".into(), "status".into()], false)
            .await
            .unwrap();

        let searchable = core.ctx.search().get_searchable_columns("orders").await.unwrap();
        assert_eq!(
            searchable,
            vec![SearchableColumn {
                name: "status".into(),
                data_type: DataType::Text,
            }]
        );
    }

    #[tokio::test]
    async fn test_numeric_range_and_paging() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        core.ctx
            .indexes()
            .create_index("idx_total", "orders", vec!["total".into()], false)
            .await
            .unwrap();
        for total in [5, 15, 25, 35] {
            core.insert_order(total, "open").await;
        }

        let result = core
            .ctx
            .search()
            .search_records(
                "orders",
                &[SearchPredicate::new("total", SearchOperator::Gt, Some(json!(10)))],
                0,
                Some(2),
            )
            .await
            .unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.data.len(), 2);
        assert!(result.has_more);

        let err = core
            .ctx
            .search()
            .search_records(
                "orders",
                &[SearchPredicate::new("total", SearchOperator::Lt, Some(json!("abc")))],
                0,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));
    }
}
