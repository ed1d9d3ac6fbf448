//! Record operations on user tables.
//!
//! Every operation takes the scope resolved by the access gate. Owner
//! filtering is part of the single statement that reads or mutates, so an
//! update or delete of a row the caller does not own affects nothing and
//! reports `NotFound`.

use std::sync::Arc;

use tabula_commons::{
    quote_ident, validate_identifier, ColumnDescriptor, IdentifierKind, PageRequest, Record,
    RecordPage,
};
use tabula_configs::LimitsSettings;
use tabula_session::{ReadScope, WriteScope};
use tabula_store::{SqlStorage, SqlStorageAsync, SqlValue, Statement};

use crate::catalog::SchemaCatalog;
use crate::ddl::{is_implicit_column, ID_COLUMN, UPDATED_AT_COLUMN};
use crate::error::{Result, TabulaError};

pub struct DataService {
    catalog: Arc<SchemaCatalog>,
    limits: LimitsSettings,
}

/// Owner filter rendered into a WHERE clause.
struct OwnerFilter<'a> {
    column: &'a str,
    caller_id: &'a str,
}

impl DataService {
    pub fn new(catalog: Arc<SchemaCatalog>, limits: LimitsSettings) -> Self {
        Self { catalog, limits }
    }

    fn storage(&self) -> &Arc<dyn SqlStorage> {
        self.catalog.storage()
    }

    pub fn limits(&self) -> &LimitsSettings {
        &self.limits
    }

    /// Page of records, optionally sorted by an existing column.
    pub async fn list(&self, table: &str, page: &PageRequest, scope: &ReadScope) -> Result<RecordPage> {
        let columns = self.user_table_columns(table).await?;
        let limit = self.limits.clamp_page_size(page.limit);

        let owner = match scope {
            ReadScope::Empty => return Ok(RecordPage::empty(limit, page.offset)),
            ReadScope::Unrestricted => None,
            ReadScope::OwnedBy {
                owner_column,
                caller_id,
            } => Some(OwnerFilter {
                column: owner_column,
                caller_id: caller_id.as_str(),
            }),
        };

        let order_by = match &page.sort_by {
            Some(sort_by) => {
                let column = find_column(&columns, sort_by).ok_or_else(|| {
                    TabulaError::invalid_input(format!(
                        "Cannot sort by unknown column '{}'",
                        sort_by
                    ))
                })?;
                format!("{} {}", quote_ident(&column.name), page.sort_order.as_sql())
            }
            None => "rowid ASC".to_string(),
        };

        let (where_clause, params) = owner_clause(owner.as_ref());
        let count_sql = format!(
            "SELECT COUNT(*) AS n FROM {}{}",
            quote_ident(table),
            where_clause
        );
        let total = self
            .storage()
            .first_async(Statement::new(count_sql).bind_all(params.clone()))
            .await?
            .and_then(|r| r.get_i64("n"))
            .unwrap_or(0)
            .max(0) as u64;

        let select_sql = format!(
            "SELECT * FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
            quote_ident(table),
            where_clause,
            order_by
        );
        let rows = self
            .storage()
            .all_async(
                Statement::new(select_sql)
                    .bind_all(params)
                    .bind(i64::from(limit))
                    .bind(page.offset),
            )
            .await?;

        Ok(RecordPage {
            data: rows.iter().map(|r| r.to_json_map()).collect(),
            total,
            limit,
            offset: page.offset,
        })
    }

    /// One record by id.
    ///
    /// `Ok(None)` for the empty scope; `NotFound` when no visible row has
    /// the id.
    pub async fn get(&self, table: &str, id: &str, scope: &ReadScope) -> Result<Option<Record>> {
        self.user_table_columns(table).await?;
        let owner = match scope {
            ReadScope::Empty => return Ok(None),
            ReadScope::Unrestricted => None,
            ReadScope::OwnedBy {
                owner_column,
                caller_id,
            } => Some(OwnerFilter {
                column: owner_column,
                caller_id: caller_id.as_str(),
            }),
        };

        self.fetch(table, id, owner.as_ref())
            .await?
            .map(Some)
            .ok_or_else(|| record_not_found(table, id))
    }

    /// Insert a record. The id is generated (UUID v4) unless supplied; an
    /// owned scope stamps the owner column with the caller id.
    pub async fn create(
        &self,
        table: &str,
        mut data: Record,
        id: Option<String>,
        scope: &WriteScope,
    ) -> Result<Record> {
        let columns = self.user_table_columns(table).await?;
        require_id_column(table, &columns)?;

        if let WriteScope::OwnedBy {
            owner_column,
            caller_id,
        } = scope
        {
            let owner = find_column(&columns, owner_column).ok_or_else(|| {
                TabulaError::invalid_input(format!(
                    "Private table '{}' has no owner column '{}'",
                    table, owner_column
                ))
            })?;
            if let Some(existing) = data.get(&owner.name) {
                if existing.as_str() != Some(caller_id.as_str()) {
                    return Err(TabulaError::AccessDenied(format!(
                        "Cannot create a record in '{}' owned by another caller",
                        table
                    )));
                }
            }
            data.insert(owner.name.clone(), caller_id.as_str().into());
        }

        let id = match id {
            Some(id) if id.trim().is_empty() => {
                return Err(TabulaError::invalid_input("Record id cannot be empty"))
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        let assignments = writable_values(table, &columns, &data)?;
        let mut names = vec![quote_ident(ID_COLUMN)];
        let mut params = vec![SqlValue::from(id.as_str())];
        for (column, value) in assignments {
            names.push(quote_ident(column));
            params.push(value);
        }
        let placeholders = vec!["?"; names.len()].join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names.join(", "),
            placeholders
        );
        self.storage()
            .run_async(Statement::new(sql).bind_all(params))
            .await?;

        self.fetch(table, &id, None)
            .await?
            .ok_or_else(|| record_not_found(table, &id))
    }

    /// Update one record with a single conditional statement.
    pub async fn update(
        &self,
        table: &str,
        id: &str,
        data: Record,
        scope: &WriteScope,
    ) -> Result<Record> {
        let columns = self.user_table_columns(table).await?;
        require_id_column(table, &columns)?;
        if data.is_empty() {
            return Err(TabulaError::invalid_input("Update payload is empty"));
        }

        let owner = owned_by(scope);
        if let Some(filter) = &owner {
            let reassigns = data.iter().any(|(k, v)| {
                k.eq_ignore_ascii_case(filter.column) && v.as_str() != Some(filter.caller_id)
            });
            if reassigns {
                return Err(TabulaError::AccessDenied(format!(
                    "Cannot reassign ownership of records in '{}'",
                    table
                )));
            }
        }

        let assignments = writable_values(table, &columns, &data)?;
        let mut sets: Vec<String> = Vec::with_capacity(assignments.len() + 1);
        let mut params: Vec<SqlValue> = Vec::with_capacity(assignments.len() + 2);
        for (column, value) in assignments {
            sets.push(format!("{} = ?", quote_ident(column)));
            params.push(value);
        }
        if find_column(&columns, UPDATED_AT_COLUMN).is_some() {
            sets.push(format!("{} = CURRENT_TIMESTAMP", quote_ident(UPDATED_AT_COLUMN)));
        }

        params.push(SqlValue::from(id));
        let (owner_sql, owner_params) = owner_condition(owner.as_ref());
        params.extend(owner_params);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(table),
            sets.join(", "),
            quote_ident(ID_COLUMN),
            owner_sql
        );
        let result = self
            .storage()
            .run_async(Statement::new(sql).bind_all(params))
            .await?;
        if result.changes == 0 {
            return Err(record_not_found(table, id));
        }

        self.fetch(table, id, None)
            .await?
            .ok_or_else(|| record_not_found(table, id))
    }

    pub async fn delete(&self, table: &str, id: &str, scope: &WriteScope) -> Result<()> {
        let columns = self.user_table_columns(table).await?;
        require_id_column(table, &columns)?;

        let owner = owned_by(scope);
        let (owner_sql, owner_params) = owner_condition(owner.as_ref());
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?{}",
            quote_ident(table),
            quote_ident(ID_COLUMN),
            owner_sql
        );
        let result = self
            .storage()
            .run_async(Statement::new(sql).bind(id).bind_all(owner_params))
            .await?;
        if result.changes == 0 {
            return Err(record_not_found(table, id));
        }
        Ok(())
    }

    /// Columns of a user table; rejects protected and malformed names.
    async fn user_table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        if self.catalog.protected_tables().is_protected(table) {
            return Err(TabulaError::SystemTableProtected(table.to_string()));
        }
        validate_identifier(IdentifierKind::Table, table)?;
        self.catalog.get_table_columns(table).await
    }

    async fn fetch(&self, table: &str, id: &str, owner: Option<&OwnerFilter<'_>>) -> Result<Option<Record>> {
        let (owner_sql, owner_params) = owner_condition(owner);
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?{}",
            quote_ident(table),
            quote_ident(ID_COLUMN),
            owner_sql
        );
        let row = self
            .storage()
            .first_async(Statement::new(sql).bind(id).bind_all(owner_params))
            .await?;
        Ok(row.map(|r| r.to_json_map()))
    }
}

fn owned_by(scope: &WriteScope) -> Option<OwnerFilter<'_>> {
    match scope {
        WriteScope::Unrestricted => None,
        WriteScope::OwnedBy {
            owner_column,
            caller_id,
        } => Some(OwnerFilter {
            column: owner_column,
            caller_id: caller_id.as_str(),
        }),
    }
}

fn owner_clause(owner: Option<&OwnerFilter<'_>>) -> (String, Vec<SqlValue>) {
    match owner {
        Some(filter) => (
            format!(" WHERE {} = ?", quote_ident(filter.column)),
            vec![SqlValue::from(filter.caller_id)],
        ),
        None => (String::new(), Vec::new()),
    }
}

fn owner_condition(owner: Option<&OwnerFilter<'_>>) -> (String, Vec<SqlValue>) {
    match owner {
        Some(filter) => (
            format!(" AND {} = ?", quote_ident(filter.column)),
            vec![SqlValue::from(filter.caller_id)],
        ),
        None => (String::new(), Vec::new()),
    }
}

fn find_column<'a>(columns: &'a [ColumnDescriptor], name: &str) -> Option<&'a ColumnDescriptor> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

fn require_id_column(table: &str, columns: &[ColumnDescriptor]) -> Result<()> {
    if find_column(columns, ID_COLUMN).is_none() {
        return Err(TabulaError::invalid_input(format!(
            "Table '{}' has no '{}' column",
            table, ID_COLUMN
        )));
    }
    Ok(())
}

/// Payload entries mapped onto real column names; unknown and implicit
/// columns are rejected.
fn writable_values<'a>(
    table: &str,
    columns: &'a [ColumnDescriptor],
    data: &Record,
) -> Result<Vec<(&'a str, SqlValue)>> {
    data.iter()
        .map(|(key, value)| {
            let column = find_column(columns, key).ok_or_else(|| {
                TabulaError::invalid_input(format!("Unknown column '{}' in '{}'", key, table))
            })?;
            if is_implicit_column(&column.name) {
                return Err(TabulaError::invalid_input(format!(
                    "Column '{}' is managed by the platform and cannot be written",
                    column.name
                )));
            }
            Ok((column.name.as_str(), SqlValue::from_json(value)))
        })
        .collect()
}

fn record_not_found(table: &str, id: &str) -> TabulaError {
    TabulaError::NotFound(format!("Record '{}' not found in '{}'", id, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestCore;
    use serde_json::json;
    use tabula_commons::{CallerId, SortOrder};

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_generates_id_and_timestamps() {
        let core = TestCore::new().await;
        core.create_orders_table().await;

        let created = core
            .ctx
            .data()
            .create(
                "orders",
                record(json!({"total": 5, "status": "open"})),
                None,
                &WriteScope::Unrestricted,
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert_eq!(created["total"], json!(5));
        assert!(created["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_and_implicit_columns_rejected() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        let data = core.ctx.data();

        let err = data
            .create("orders", record(json!({"nope": 1})), None, &WriteScope::Unrestricted)
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));

        let err = data
            .create("orders", record(json!({"id": "x"})), None, &WriteScope::Unrestricted)
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_list_sorting_and_paging() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        for total in [30, 10, 20] {
            core.insert_order(total, "open").await;
        }
        let data = core.ctx.data();

        let page = data
            .list(
                "orders",
                &PageRequest::new(2, 0).sorted("total", SortOrder::Desc),
                &ReadScope::Unrestricted,
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0]["total"], json!(30));
        assert!(page.has_more());

        let err = data
            .list(
                "orders",
                &PageRequest::new(2, 0).sorted("total; DROP TABLE orders", SortOrder::Asc),
                &ReadScope::Unrestricted,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));

        let clamped = data
            .list("orders", &PageRequest::new(0, 0), &ReadScope::Unrestricted)
            .await
            .unwrap();
        assert_eq!(clamped.limit, 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_are_owner_conditional() {
        let core = TestCore::new().await;
        core.create_notes_table().await;
        let data = core.ctx.data();
        let owned = |id: &str| WriteScope::OwnedBy {
            owner_column: "user_id".into(),
            caller_id: CallerId::new(id),
        };

        let note = data
            .create("notes", record(json!({"body": "hi"})), None, &owned("u1"))
            .await
            .unwrap();
        let id = note["id"].as_str().unwrap().to_string();
        assert_eq!(note["user_id"], json!("u1"));

        let err = data
            .update("notes", &id, record(json!({"body": "x"})), &owned("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::NotFound(_)));

        let err = data
            .update("notes", &id, record(json!({"user_id": "u2"})), &owned("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::AccessDenied(_)));

        let updated = data
            .update("notes", &id, record(json!({"body": "edited"})), &owned("u1"))
            .await
            .unwrap();
        assert_eq!(updated["body"], json!("edited"));

        assert!(matches!(
            data.delete("notes", &id, &owned("u2")).await,
            Err(TabulaError::NotFound(_))
        ));
        data.delete("notes", &id, &owned("u1")).await.unwrap();
        assert!(matches!(
            data.get("notes", &id, &ReadScope::Unrestricted).await,
            Err(TabulaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_protected_tables_rejected() {
        let core = TestCore::new().await;
        let err = core
            .ctx
            .data()
            .list("schema_snapshots", &PageRequest::new(10, 0), &ReadScope::Unrestricted)
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::SystemTableProtected(_)));
    }

    #[tokio::test]
    async fn test_create_with_explicit_id() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        let created = core
            .ctx
            .data()
            .create(
                "orders",
                record(json!({"total": 1})),
                Some("order-1".into()),
                &WriteScope::Unrestricted,
            )
            .await
            .unwrap();
        assert_eq!(created["id"], json!("order-1"));

        let fetched = core
            .ctx
            .data()
            .get("orders", "order-1", &ReadScope::Unrestricted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched["total"], json!(1));
    }
}
