//! Access control gate
//!
//! Resolves the effective scope from the table's recorded policy and the
//! caller's identity, then runs the record operation under that scope.
//!
//! # Access Rules
//!
//! | Policy  | admin / api_key | end_user (id)      | end_user (no id) / anonymous |
//! |---------|-----------------|--------------------|------------------------------|
//! | public  | all rows        | all rows           | all rows                     |
//! | private | all rows        | owned rows only    | empty reads, writes rejected |
//!
//! The unscoped methods (`get_table_data`, `create_record`, ...) are for
//! trusted collaborators that have already authorized the request.

use std::sync::Arc;

use tabula_commons::{AccessContext, PageRequest, Record, RecordPage};
use tabula_session::{read_scope, write_scope, ReadScope, WriteScope};

use crate::catalog::SchemaCatalog;
use crate::data::DataService;
use crate::error::{Result, TabulaError};

pub struct AccessControlGate {
    catalog: Arc<SchemaCatalog>,
    data: Arc<DataService>,
}

impl AccessControlGate {
    pub fn new(catalog: Arc<SchemaCatalog>, data: Arc<DataService>) -> Self {
        Self { catalog, data }
    }

    pub async fn resolve_read(&self, table: &str, ctx: &AccessContext) -> Result<ReadScope> {
        self.ensure_user_table(table)?;
        let policy = self.catalog.table_policy(table).await?;
        Ok(read_scope(
            table,
            policy.access_policy,
            &policy.owner_column,
            ctx,
        )?)
    }

    pub async fn resolve_write(&self, table: &str, ctx: &AccessContext) -> Result<WriteScope> {
        self.ensure_user_table(table)?;
        let policy = self.catalog.table_policy(table).await?;
        Ok(write_scope(
            table,
            policy.access_policy,
            &policy.owner_column,
            ctx,
        )?)
    }

    pub async fn get_table_data(&self, table: &str, page: &PageRequest) -> Result<RecordPage> {
        self.data.list(table, page, &ReadScope::Unrestricted).await
    }

    pub async fn get_table_data_with_access_control(
        &self,
        table: &str,
        page: &PageRequest,
        ctx: &AccessContext,
    ) -> Result<RecordPage> {
        let scope = self.resolve_read(table, ctx).await?;
        self.data.list(table, page, &scope).await
    }

    pub async fn get_record_by_id(&self, table: &str, id: &str) -> Result<Record> {
        self.data
            .get(table, id, &ReadScope::Unrestricted)
            .await?
            .ok_or_else(|| TabulaError::NotFound(format!("Record '{}' not found in '{}'", id, table)))
    }

    /// `Ok(None)` when the caller has no identity on a private table.
    pub async fn get_record_by_id_with_access_control(
        &self,
        table: &str,
        id: &str,
        ctx: &AccessContext,
    ) -> Result<Option<Record>> {
        let scope = self.resolve_read(table, ctx).await?;
        self.data.get(table, id, &scope).await
    }

    pub async fn create_record(&self, table: &str, data: Record) -> Result<Record> {
        self.data
            .create(table, data, None, &WriteScope::Unrestricted)
            .await
    }

    pub async fn create_record_with_id(&self, table: &str, id: &str, data: Record) -> Result<Record> {
        self.data
            .create(table, data, Some(id.to_string()), &WriteScope::Unrestricted)
            .await
    }

    /// Create under the caller's scope. On a private table the returned
    /// record carries the owner column stamped with the caller id.
    pub async fn create_record_with_access_control(
        &self,
        table: &str,
        data: Record,
        ctx: &AccessContext,
    ) -> Result<Record> {
        let scope = self.resolve_write(table, ctx).await?;
        self.data.create(table, data, None, &scope).await
    }

    pub async fn update_record(&self, table: &str, id: &str, data: Record) -> Result<Record> {
        self.data
            .update(table, id, data, &WriteScope::Unrestricted)
            .await
    }

    pub async fn update_record_with_access_control(
        &self,
        table: &str,
        id: &str,
        data: Record,
        ctx: &AccessContext,
    ) -> Result<Record> {
        let scope = self.resolve_write(table, ctx).await?;
        self.data.update(table, id, data, &scope).await
    }

    pub async fn delete_record(&self, table: &str, id: &str) -> Result<()> {
        self.data.delete(table, id, &WriteScope::Unrestricted).await
    }

    pub async fn delete_record_with_access_control(
        &self,
        table: &str,
        id: &str,
        ctx: &AccessContext,
    ) -> Result<()> {
        let scope = self.resolve_write(table, ctx).await?;
        self.data.delete(table, id, &scope).await
    }

    fn ensure_user_table(&self, table: &str) -> Result<()> {
        if self.catalog.protected_tables().is_protected(table) {
            log::warn!("❌ Record access to '{}' blocked: protected system table", table);
            return Err(TabulaError::SystemTableProtected(table.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TestCore;
    use serde_json::json;

    fn body(text: &str) -> Record {
        json!({ "body": text }).as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_private_table_visibility() {
        let core = TestCore::new().await;
        core.create_notes_table().await;
        let gate = core.ctx.access();
        let u1 = AccessContext::end_user("u1");
        let u2 = AccessContext::end_user("u2");
        let admin = AccessContext::admin("root");

        let r = gate
            .create_record_with_access_control("notes", body("mine"), &u1)
            .await
            .unwrap();
        let id = r["id"].as_str().unwrap().to_string();
        assert_eq!(r["user_id"], json!("u1"));

        let page = PageRequest::new(50, 0);
        let u1_list = gate.get_table_data_with_access_control("notes", &page, &u1).await.unwrap();
        assert_eq!(u1_list.total, 1);
        assert!(gate
            .get_record_by_id_with_access_control("notes", &id, &u1)
            .await
            .unwrap()
            .is_some());

        let u2_list = gate.get_table_data_with_access_control("notes", &page, &u2).await.unwrap();
        assert_eq!(u2_list.total, 0);
        assert!(matches!(
            gate.get_record_by_id_with_access_control("notes", &id, &u2).await,
            Err(TabulaError::NotFound(_))
        ));

        let admin_list = gate.get_table_data_with_access_control("notes", &page, &admin).await.unwrap();
        assert_eq!(admin_list.total, 1);
        assert!(gate
            .get_record_by_id_with_access_control("notes", &id, &admin)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_identity_on_private_table() {
        let core = TestCore::new().await;
        core.create_notes_table().await;
        let gate = core.ctx.access();
        gate.create_record_with_access_control("notes", body("x"), &AccessContext::end_user("u1"))
            .await
            .unwrap();

        for ctx in [AccessContext::unresolved_end_user(), AccessContext::anonymous()] {
            let page = gate
                .get_table_data_with_access_control("notes", &PageRequest::new(10, 0), &ctx)
                .await
                .unwrap();
            assert!(page.data.is_empty());
            assert_eq!(page.total, 0);

            let err = gate
                .create_record_with_access_control("notes", body("y"), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, TabulaError::AuthenticationRequired(_)));
        }
    }

    #[tokio::test]
    async fn test_public_table_same_for_every_caller() {
        let core = TestCore::new().await;
        core.create_orders_table().await;
        core.insert_order(1, "open").await;
        core.insert_order(2, "closed").await;
        let gate = core.ctx.access();
        let page = PageRequest::new(50, 0);

        let baseline = gate.get_table_data("orders", &page).await.unwrap();
        for ctx in [
            AccessContext::admin("a"),
            AccessContext::api_key("k"),
            AccessContext::end_user("u"),
            AccessContext::unresolved_end_user(),
            AccessContext::anonymous(),
        ] {
            let seen = gate
                .get_table_data_with_access_control("orders", &page, &ctx)
                .await
                .unwrap();
            assert_eq!(seen.data, baseline.data);
            assert_eq!(seen.total, baseline.total);
        }
    }
}
