use anyhow::Result;
use serde_json::{json, Value};
use tabula_core::{AppContext, TabulaError};

use crate::args::SnapshotCommand;

pub async fn run_snapshot(ctx: &AppContext, command: &SnapshotCommand, actor: &str) -> Result<Value> {
    let store = ctx.snapshots();
    let value = match command {
        SnapshotCommand::Create { name, description } => {
            let snapshot = store
                .create_snapshot(name.clone(), description.clone(), Some(actor.to_string()))
                .await?;
            serde_json::to_value(snapshot)?
        }
        SnapshotCommand::List { limit, offset } => {
            serde_json::to_value(store.get_snapshots(*limit, *offset).await?)?
        }
        SnapshotCommand::Show { id } => match store.get_snapshot(id).await? {
            Some(snapshot) => serde_json::to_value(snapshot)?,
            None => return Err(TabulaError::NotFound(format!("Snapshot '{}' not found", id)).into()),
        },
        SnapshotCommand::Restore { id, yes } => {
            if !yes {
                anyhow::bail!("Restore drops all rows in the affected tables; pass --yes to confirm");
            }
            let report = store.restore_snapshot(id).await?;
            json!({
                "snapshot_id": report.snapshot_id,
                "version": report.version,
                "restored": report.restored,
                "dropped": report.dropped,
            })
        }
        SnapshotCommand::Delete { id } => {
            store.delete_snapshot(id).await?;
            json!({ "deleted": id })
        }
        SnapshotCommand::Diff { from, to } => {
            serde_json::to_value(store.compare_snapshots(from, to).await?)?
        }
    };
    Ok(value)
}
