use anyhow::Result;
use serde_json::{json, Value};
use tabula_core::AppContext;

pub async fn tables(ctx: &AppContext) -> Result<Value> {
    let tables = ctx.catalog().get_tables().await?;
    Ok(serde_json::to_value(tables)?)
}

/// Columns, foreign keys and indexes of one table.
pub async fn columns(ctx: &AppContext, table: &str) -> Result<Value> {
    let shape = ctx.catalog().table_shape(table).await?;
    Ok(json!({
        "table": shape.table,
        "columns": shape.columns,
        "foreign_keys": shape.foreign_keys,
        "indexes": shape.indexes,
    }))
}

pub async fn sql(ctx: &AppContext, query: &str) -> Result<Value> {
    let rows = ctx.sql().execute_sql(query).await?;
    Ok(json!({ "rows": rows, "count": rows.len() }))
}
