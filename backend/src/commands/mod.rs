//! Subcommand handlers. Each returns the JSON document printed on stdout.

mod snapshot;
mod tables;

pub use snapshot::run_snapshot;
pub use tables::{columns, sql, tables};

use anyhow::Result;
use serde_json::Value;
use tabula_core::AppContext;

use crate::args::Command;

pub async fn dispatch(ctx: &AppContext, command: &Command, actor: &str) -> Result<Value> {
    match command {
        Command::Tables => tables(ctx).await,
        Command::Columns { table } => columns(ctx, table).await,
        Command::Snapshot(sub) => run_snapshot(ctx, sub, actor).await,
        Command::Sql { query } => sql(ctx, query).await,
    }
}
