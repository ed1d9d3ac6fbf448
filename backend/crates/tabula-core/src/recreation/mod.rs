//! Column-change strategies.
//!
//! A column change is planned by a `ColumnChangeStrategy` into a list of
//! statements and executed as exactly one atomic batch. `DirectAlterStrategy`
//! is used when the engine supports the in-place ALTER form; the
//! `TableRecreationEngine` handles everything else with a
//! create-copy-drop-rename batch.

mod direct;
mod engine;

pub use direct::DirectAlterStrategy;
pub use engine::{TableRecreationEngine, TEMP_TABLE_MARKER};

use std::sync::Arc;

use tabula_commons::ColumnChangeRequest;
use tabula_store::{SqlStorage, SqlStorageAsync, Statement};

use crate::catalog::TableShape;
use crate::error::Result;

/// Structural change to one column of an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnChange {
    Modify {
        column: String,
        changes: ColumnChangeRequest,
    },
    Rename {
        from: String,
        to: String,
    },
    Drop {
        column: String,
    },
}

impl ColumnChange {
    /// Column the change targets (the old name for a rename).
    pub fn column(&self) -> &str {
        match self {
            ColumnChange::Modify { column, .. } | ColumnChange::Drop { column } => column,
            ColumnChange::Rename { from, .. } => from,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ColumnChange::Modify { column, changes } => format!("MODIFY {} {:?}", column, changes),
            ColumnChange::Rename { from, to } => format!("RENAME {} TO {}", from, to),
            ColumnChange::Drop { column } => format!("DROP {}", column),
        }
    }
}

/// One way of turning a `ColumnChange` into statements.
pub trait ColumnChangeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can apply the change to a table of this shape.
    fn supports(&self, change: &ColumnChange, shape: &TableShape) -> bool;

    /// Statements that apply the change, in execution order.
    fn plan(&self, change: &ColumnChange, shape: &TableShape) -> Result<Vec<Statement>>;
}

/// Outcome of `ColumnChangeApplier::apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    pub strategy: &'static str,
    pub statements: usize,
}

/// Picks the first strategy that supports a change and runs its plan as one
/// batch.
pub struct ColumnChangeApplier {
    storage: Arc<dyn SqlStorage>,
    strategies: Vec<Box<dyn ColumnChangeStrategy>>,
}

impl ColumnChangeApplier {
    /// Direct ALTER when the engine's capabilities allow it, recreation
    /// otherwise.
    pub fn new(storage: Arc<dyn SqlStorage>) -> Self {
        let capabilities = storage.capabilities();
        Self {
            storage,
            strategies: vec![
                Box::new(DirectAlterStrategy::new(capabilities)),
                Box::new(TableRecreationEngine::new()),
            ],
        }
    }

    pub fn with_strategies(
        storage: Arc<dyn SqlStorage>,
        strategies: Vec<Box<dyn ColumnChangeStrategy>>,
    ) -> Self {
        Self {
            storage,
            strategies,
        }
    }

    pub fn select(&self, change: &ColumnChange, shape: &TableShape) -> Option<&dyn ColumnChangeStrategy> {
        self.strategies
            .iter()
            .find(|s| s.supports(change, shape))
            .map(|s| s.as_ref())
    }

    pub async fn apply(&self, change: &ColumnChange, shape: &TableShape) -> Result<AppliedChange> {
        let strategy = self.select(change, shape).ok_or_else(|| {
            crate::error::TabulaError::unsupported(format!(
                "No strategy can apply {} on '{}'",
                change.describe(),
                shape.table
            ))
        })?;

        let statements = strategy.plan(change, shape)?;
        let count = statements.len();
        log::debug!(
            "📋 {} on '{}' via {} ({} statements)",
            change.describe(),
            shape.table,
            strategy.name(),
            count
        );

        self.storage.batch_async(statements).await?;
        Ok(AppliedChange {
            strategy: strategy.name(),
            statements: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::any::Any;
    use tabula_commons::{ColumnDefault, ColumnDescriptor, DataType};
    use tabula_store::{Row, RunResult, StorageCapabilities};

    /// Storage that records batches instead of executing them.
    struct RecordingStorage {
        capabilities: StorageCapabilities,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl SqlStorage for RecordingStorage {
        fn run(&self, _statement: &Statement) -> tabula_store::Result<RunResult> {
            Ok(RunResult::default())
        }

        fn all(&self, _statement: &Statement) -> tabula_store::Result<Vec<Row>> {
            Ok(Vec::new())
        }

        fn batch(&self, statements: Vec<Statement>) -> tabula_store::Result<Vec<RunResult>> {
            let results = vec![RunResult::default(); statements.len()];
            self.batches
                .lock()
                .push(statements.iter().map(|s| s.sql().to_string()).collect());
            Ok(results)
        }

        fn capabilities(&self) -> StorageCapabilities {
            self.capabilities
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn shape() -> TableShape {
        let column =
            |ordinal: u32, name: &str, data_type: DataType, primary_key: bool| ColumnDescriptor {
                ordinal,
                name: name.into(),
                data_type,
                nullable: !primary_key,
                default_value: ColumnDefault::None,
                primary_key,
                unique: false,
            };
        TableShape {
            table: "orders".into(),
            columns: vec![
                column(0, "id", DataType::Text, true),
                column(1, "total", DataType::Integer, false),
            ],
            foreign_keys: vec![],
            indexes: vec![],
        }
    }

    #[tokio::test]
    async fn test_full_alter_support_uses_direct_statements() {
        let recording = Arc::new(RecordingStorage {
            capabilities: StorageCapabilities {
                rename_column: true,
                drop_column: true,
                alter_column_type: true,
                add_foreign_key: true,
            },
            batches: Mutex::new(Vec::new()),
        });
        let applier = ColumnChangeApplier::new(recording.clone());

        let applied = applier
            .apply(
                &ColumnChange::Modify {
                    column: "total".into(),
                    changes: ColumnChangeRequest::default()
                        .with_type(DataType::Real)
                        .with_nullable(false),
                },
                &shape(),
            )
            .await
            .unwrap();
        assert_eq!(applied.strategy, "direct_alter");

        let batches = recording.batches.lock();
        assert_eq!(
            batches[0],
            vec![
                "ALTER TABLE \"orders\" ALTER COLUMN \"total\" TYPE REAL".to_string(),
                "ALTER TABLE \"orders\" ALTER COLUMN \"total\" SET NOT NULL".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_alter_support_falls_back_to_recreation() {
        let recording = Arc::new(RecordingStorage {
            capabilities: StorageCapabilities::default(),
            batches: Mutex::new(Vec::new()),
        });
        let applier = ColumnChangeApplier::new(recording.clone());

        let applied = applier
            .apply(
                &ColumnChange::Rename {
                    from: "total".into(),
                    to: "amount".into(),
                },
                &shape(),
            )
            .await
            .unwrap();
        assert_eq!(applied.strategy, "table_recreation");

        let batches = recording.batches.lock();
        assert_eq!(batches.len(), 1);
        assert!(batches[0][0].starts_with("CREATE TABLE \"orders__tabula_new_"));
        assert!(batches[0].last().unwrap().ends_with("RENAME TO \"orders\""));
    }
}
