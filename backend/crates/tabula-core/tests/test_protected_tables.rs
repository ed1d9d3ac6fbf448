//! Protected names are rejected by every entry point, before any statement
//! is built.

use serde_json::json;
use tabula_commons::{
    is_valid_identifier, AccessContext, ColumnChangeRequest, ColumnSpec, CreateTableOptions,
    DataType, PageRequest, Record, SystemTable,
};
use tabula_configs::CoreConfig;
use tabula_core::test_helpers::TestCore;
use tabula_core::TabulaError;

fn protected_names() -> Vec<String> {
    let mut names: Vec<String> = SystemTable::all()
        .iter()
        .map(|t| t.table_name().to_string())
        .collect();
    names.extend(["Users".to_string(), "sqlite_master".to_string(), "_cf_kv".to_string()]);
    names
}

#[tokio::test]
async fn test_structural_operations_reject_protected_names() {
    let core = TestCore::new().await;
    let schema = core.ctx.schema();

    for name in protected_names() {
        let results = [
            schema
                .create_table(&name, vec![], CreateTableOptions::default())
                .await
                .map(|_| ()),
            schema.drop_table(&name).await,
            schema
                .add_column(&name, ColumnSpec::new("extra", DataType::Text))
                .await,
            schema.rename_column(&name, "a", "b").await.map(|_| ()),
            schema.drop_column(&name, "a").await.map(|_| ()),
            schema
                .modify_column(
                    &name,
                    "a",
                    ColumnChangeRequest::default().with_nullable(true),
                )
                .await
                .map(|_| ()),
            core.ctx
                .indexes()
                .create_index("idx_x", &name, vec!["a".into()], false)
                .await
                .map(|_| ()),
        ];
        for result in results {
            assert!(
                matches!(result, Err(TabulaError::SystemTableProtected(_))),
                "{} -> {:?}",
                name,
                result
            );
        }
    }
}

#[tokio::test]
async fn test_record_operations_reject_protected_names() {
    let core = TestCore::new().await;
    let access = core.ctx.access();
    let admin = AccessContext::admin("root");

    for name in protected_names() {
        let page = access
            .get_table_data_with_access_control(&name, &PageRequest::new(10, 0), &admin)
            .await;
        assert!(matches!(page, Err(TabulaError::SystemTableProtected(_))));

        let created = access
            .create_record_with_access_control(&name, Record::new(), &admin)
            .await;
        assert!(matches!(created, Err(TabulaError::SystemTableProtected(_))));

        let deleted = access.delete_record_with_access_control(&name, "x", &admin).await;
        assert!(matches!(deleted, Err(TabulaError::SystemTableProtected(_))));
    }
}

#[tokio::test]
async fn test_raw_sql_rejects_protected_names() {
    let core = TestCore::new().await;
    core.create_orders_table().await;
    core.insert_order(1, "open").await;
    let sql = core.ctx.sql();

    for name in protected_names() {
        let result = sql.execute_sql(&format!("SELECT * FROM {}", name)).await;
        assert!(
            matches!(result, Err(TabulaError::SystemTableProtected(_))),
            "{}",
            name
        );
    }

    let rows = sql
        .execute_sql("SELECT total, status FROM orders;")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("status"), Some(&json!("open")));

    assert!(matches!(
        sql.execute_sql("UPDATE orders SET total = 0").await,
        Err(TabulaError::UnsupportedQuery(_))
    ));
}

#[tokio::test]
async fn test_table_names_follow_identifier_rule() {
    let core = TestCore::new().await;
    let candidates = [
        "orders_2024",
        "_staging",
        "Line_Items",
        "2fast",
        "bad-name",
        "with space",
        "",
        "quote\"d",
        "semi;colon",
        "caf\u{e9}",
    ];

    for name in candidates {
        let result = core
            .ctx
            .schema()
            .create_table(name, vec![], CreateTableOptions::default())
            .await;
        if is_valid_identifier(name) {
            assert!(result.is_ok(), "{} should be accepted: {:?}", name, result);
        } else {
            assert!(
                matches!(result, Err(TabulaError::InvalidIdentifier { .. })),
                "{} should be rejected: {:?}",
                name,
                result
            );
        }
    }

    let err = core
        .ctx
        .schema()
        .add_column("orders_2024", ColumnSpec::new("bad col", DataType::Text))
        .await
        .unwrap_err();
    assert!(matches!(err, TabulaError::InvalidIdentifier { .. }));
}

#[tokio::test]
async fn test_configured_protection_is_injected() {
    let mut config = CoreConfig::default();
    config.schema.extra_protected_tables = vec!["ledger".into()];
    config.schema.reserved_prefixes = vec!["tmp_".into()];
    let core = TestCore::with_config(config).await;

    for name in ["ledger", "tmp_import", "users"] {
        let result = core
            .ctx
            .schema()
            .create_table(name, vec![], CreateTableOptions::default())
            .await;
        assert!(
            matches!(result, Err(TabulaError::SystemTableProtected(_))),
            "{}",
            name
        );
    }
    // Default prefixes are replaced by the configured ones
    assert!(core
        .ctx
        .schema()
        .create_table("_cf_local", vec![], CreateTableOptions::default())
        .await
        .is_ok());
}
