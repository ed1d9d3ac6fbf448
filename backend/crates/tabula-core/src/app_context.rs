//! AppContext for Tabula
//!
//! Central registry of the core services. Built once by the host with the
//! storage, object-storage and background ports; every service shares the
//! same catalog and protected-table set. Not a process-wide singleton: a
//! host may hold several contexts (one per database).

use std::sync::Arc;

use tabula_commons::{ProtectedTables, SystemTable};
use tabula_configs::CoreConfig;
use tabula_store::{BackgroundTasks, ObjectStoragePort, SqlStorage};

use crate::access::AccessControlGate;
use crate::catalog::SchemaCatalog;
use crate::data::DataService;
use crate::ddl::NameValidator;
use crate::error::Result;
use crate::indexes::IndexManager;
use crate::recreation::ColumnChangeApplier;
use crate::schema::SchemaManager;
use crate::search::SearchIndexResolver;
use crate::snapshots::SnapshotStore;
use crate::sql::{RawQueryExecutor, SqlGuard};
use crate::system_schema;
use crate::validation::ColumnChangeValidator;

pub struct AppContext {
    config: Arc<CoreConfig>,
    storage: Arc<dyn SqlStorage>,
    protected: ProtectedTables,
    catalog: Arc<SchemaCatalog>,
    schema: Arc<SchemaManager>,
    validator: Arc<ColumnChangeValidator>,
    applier: Arc<ColumnChangeApplier>,
    data: Arc<DataService>,
    access: Arc<AccessControlGate>,
    indexes: Arc<IndexManager>,
    search: Arc<SearchIndexResolver>,
    snapshots: Arc<SnapshotStore>,
    sql: Arc<RawQueryExecutor>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("protected", &self.protected)
            .field("catalog", &self.catalog)
            .field("storage", &"Arc<dyn SqlStorage>")
            .field("schema", &"Arc<SchemaManager>")
            .field("data", &"Arc<DataService>")
            .field("access", &"Arc<AccessControlGate>")
            .field("indexes", &"Arc<IndexManager>")
            .field("search", &"Arc<SearchIndexResolver>")
            .field("snapshots", &"Arc<SnapshotStore>")
            .field("sql", &"Arc<RawQueryExecutor>")
            .finish()
    }
}

impl AppContext {
    /// Build every service and create the core-owned system tables.
    ///
    /// # Parameters
    /// - `config`: core configuration (schema, limits, snapshot settings)
    /// - `storage`: SQL storage port
    /// - `object_storage`: optional mirror target for snapshots
    /// - `background`: runner for deferred work (row counts, mirroring)
    pub async fn init(
        config: CoreConfig,
        storage: Arc<dyn SqlStorage>,
        object_storage: Option<Arc<dyn ObjectStoragePort>>,
        background: Arc<dyn BackgroundTasks>,
    ) -> Result<Arc<AppContext>> {
        let config = Arc::new(config);

        let protected = ProtectedTables::new(
            SystemTable::all()
                .iter()
                .map(|t| t.table_name().to_string())
                .chain(config.schema.extra_protected_tables.iter().cloned()),
            config.schema.reserved_prefixes.iter(),
        );

        system_schema::ensure_system_tables(&storage).await?;

        let validator = NameValidator::new(protected.clone());
        let catalog = Arc::new(SchemaCatalog::new(
            storage.clone(),
            protected.clone(),
            config.schema.owner_column.clone(),
            background.clone(),
        ));

        let column_validator = Arc::new(ColumnChangeValidator::new(catalog.clone()));
        let applier = Arc::new(ColumnChangeApplier::new(storage.clone()));
        let snapshots = Arc::new(SnapshotStore::new(
            catalog.clone(),
            validator.clone(),
            object_storage,
            config.snapshots.mirror_prefix.clone(),
            background,
            config.schema.auto_snapshot,
        ));
        let schema = Arc::new(SchemaManager::new(
            catalog.clone(),
            validator.clone(),
            column_validator.clone(),
            applier.clone(),
            snapshots.clone(),
        ));

        let data = Arc::new(DataService::new(catalog.clone(), config.limits.clone()));
        let access = Arc::new(AccessControlGate::new(catalog.clone(), data.clone()));
        let indexes = Arc::new(IndexManager::new(catalog.clone(), validator));
        let search = Arc::new(SearchIndexResolver::new(
            catalog.clone(),
            access.clone(),
            config.limits.clone(),
        ));
        let sql = Arc::new(RawQueryExecutor::new(
            storage.clone(),
            SqlGuard::new(protected.clone()),
        ));

        log::info!(
            "✓ Tabula core initialized ({} protected names, auto snapshots {})",
            protected.names().count(),
            if config.schema.auto_snapshot { "on" } else { "off" }
        );

        Ok(Arc::new(AppContext {
            config,
            storage,
            protected,
            catalog,
            schema,
            validator: column_validator,
            applier,
            data,
            access,
            indexes,
            search,
            snapshots,
            sql,
        }))
    }

    // ===== Getters =====

    pub fn config(&self) -> &Arc<CoreConfig> {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn SqlStorage> {
        self.storage.clone()
    }

    pub fn protected_tables(&self) -> &ProtectedTables {
        &self.protected
    }

    pub fn catalog(&self) -> Arc<SchemaCatalog> {
        self.catalog.clone()
    }

    pub fn schema(&self) -> Arc<SchemaManager> {
        self.schema.clone()
    }

    /// Column-change validator (dry-run probes)
    pub fn validator(&self) -> Arc<ColumnChangeValidator> {
        self.validator.clone()
    }

    pub fn applier(&self) -> Arc<ColumnChangeApplier> {
        self.applier.clone()
    }

    pub fn data(&self) -> Arc<DataService> {
        self.data.clone()
    }

    pub fn access(&self) -> Arc<AccessControlGate> {
        self.access.clone()
    }

    pub fn indexes(&self) -> Arc<IndexManager> {
        self.indexes.clone()
    }

    pub fn search(&self) -> Arc<SearchIndexResolver> {
        self.search.clone()
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        self.snapshots.clone()
    }

    pub fn sql(&self) -> Arc<RawQueryExecutor> {
        self.sql.clone()
    }
}
