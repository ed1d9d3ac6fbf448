//! Test helpers for tabula-core unit and integration tests.

use std::sync::Arc;

use serde_json::json;
use tabula_commons::{ColumnSpec, CreateTableOptions, DataType, Record};
use tabula_configs::CoreConfig;
use tabula_store::test_utils::TestDb;
use tabula_store::{ObjectStoragePort, TokioBackgroundTasks};

use crate::app_context::AppContext;

/// In-memory database plus a fully wired `AppContext`.
pub struct TestCore {
    pub db: TestDb,
    pub ctx: Arc<AppContext>,
    pub background: Arc<TokioBackgroundTasks>,
}

impl TestCore {
    pub async fn new() -> Self {
        Self::with_config(CoreConfig::default()).await
    }

    pub async fn with_config(config: CoreConfig) -> Self {
        Self::build(
            TestDb::new().expect("in-memory test database"),
            config,
            None,
        )
        .await
    }

    /// Context over a database whose storage reports no ALTER support, so
    /// every column change goes through table recreation.
    pub async fn without_alter_support() -> Self {
        Self::build(
            TestDb::without_alter_support().expect("in-memory test database"),
            CoreConfig::default(),
            None,
        )
        .await
    }

    pub async fn with_mirror(mirror: Arc<dyn ObjectStoragePort>) -> Self {
        Self::build(
            TestDb::new().expect("in-memory test database"),
            CoreConfig::default(),
            Some(mirror),
        )
        .await
    }

    async fn build(
        db: TestDb,
        config: CoreConfig,
        mirror: Option<Arc<dyn ObjectStoragePort>>,
    ) -> Self {
        let background = Arc::new(TokioBackgroundTasks::new());
        let ctx = AppContext::init(config, db.storage(), mirror, background.clone())
            .await
            .expect("AppContext init");
        Self {
            db,
            ctx,
            background,
        }
    }

    /// Public `orders` table with `total INTEGER` and `status TEXT`.
    pub async fn create_orders_table(&self) {
        self.ctx
            .schema()
            .create_table(
                "orders",
                vec![
                    ColumnSpec::new("total", DataType::Integer),
                    ColumnSpec::new("status", DataType::Text),
                ],
                CreateTableOptions::default(),
            )
            .await
            .expect("create orders");
    }

    pub async fn insert_order(&self, total: i64, status: &str) -> Record {
        let mut data = Record::new();
        data.insert("total".into(), json!(total));
        data.insert("status".into(), json!(status));
        self.ctx
            .access()
            .create_record("orders", data)
            .await
            .expect("insert order")
    }

    /// Private `notes` table with `body TEXT`, owned through `user_id`.
    pub async fn create_notes_table(&self) {
        self.ctx
            .schema()
            .create_table(
                "notes",
                vec![ColumnSpec::new("body", DataType::Text)],
                CreateTableOptions::private(),
            )
            .await
            .expect("create notes");
    }
}
