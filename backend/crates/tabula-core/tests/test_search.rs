use serde_json::json;
use tabula_commons::{AccessContext, SearchOperator, SearchPredicate};
use tabula_core::test_helpers::TestCore;
use tabula_core::TabulaError;

async fn orders_with_status_index() -> TestCore {
    let core = TestCore::new().await;
    core.create_orders_table().await;
    core.ctx
        .indexes()
        .create_index("idx_orders_status", "orders", vec!["status".into()], false)
        .await
        .unwrap();
    for (total, status) in [(10, "paid"), (20, "open"), (30, "paid")] {
        core.insert_order(total, status).await;
    }
    core
}

#[tokio::test]
async fn test_equality_on_indexed_text_column() {
    let core = orders_with_status_index().await;

    let result = core
        .ctx
        .search()
        .search_records(
            "orders",
            &[SearchPredicate::new("status", SearchOperator::Eq, Some(json!("paid")))],
            0,
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.data.len(), 2);
    assert!(!result.has_more);
    assert!(result.data.iter().all(|r| r["status"] == json!("paid")));
}

#[tokio::test]
async fn test_rejected_predicates() {
    let core = orders_with_status_index().await;
    let search = core.ctx.search();

    let ordering_on_text = search
        .search_records(
            "orders",
            &[SearchPredicate::new("status", SearchOperator::Gt, Some(json!("m")))],
            0,
            None,
        )
        .await;
    assert!(matches!(ordering_on_text, Err(TabulaError::UnsupportedQuery(_))));

    let not_indexed = search
        .search_records(
            "orders",
            &[SearchPredicate::new("total", SearchOperator::Eq, Some(json!(10)))],
            0,
            None,
        )
        .await;
    assert!(matches!(not_indexed, Err(TabulaError::UnsupportedQuery(_))));

    let protected = search.get_searchable_columns("users").await;
    assert!(matches!(protected, Err(TabulaError::SystemTableProtected(_))));
}

#[tokio::test]
async fn test_search_respects_private_scope() {
    let core = TestCore::new().await;
    core.create_notes_table().await;
    core.ctx
        .indexes()
        .create_index("idx_notes_body", "notes", vec!["body".into()], false)
        .await
        .unwrap();

    for (user, body) in [("u1", "hello"), ("u2", "hello"), ("u1", "bye")] {
        let mut data = serde_json::Map::new();
        data.insert("body".into(), json!(body));
        core.ctx
            .access()
            .create_record_with_access_control("notes", data, &AccessContext::end_user(user))
            .await
            .unwrap();
    }

    let hello = [SearchPredicate::new("body", SearchOperator::Eq, Some(json!("hello")))];
    let search = core.ctx.search();

    let mine = search
        .search_records_with_access_control("notes", &hello, 0, None, &AccessContext::end_user("u1"))
        .await
        .unwrap();
    assert_eq!(mine.total, 1);
    assert_eq!(mine.data[0]["user_id"], json!("u1"));

    let admin = search
        .search_records_with_access_control("notes", &hello, 0, None, &AccessContext::admin("root"))
        .await
        .unwrap();
    assert_eq!(admin.total, 2);

    let anonymous = search
        .search_records_with_access_control("notes", &hello, 0, None, &AccessContext::anonymous())
        .await
        .unwrap();
    assert_eq!(anonymous.total, 0);
    assert!(anonymous.data.is_empty());
}
