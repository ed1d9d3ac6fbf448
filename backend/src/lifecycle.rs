//! Process lifecycle helpers: configuration loading, bootstrap of the
//! storage ports and the core context, and orderly shutdown.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use tabula_configs::CoreConfig;
use tabula_core::AppContext;
use tabula_store::{
    ObjectStoragePort, ObjectStoreMirror, SqliteBackend, SqliteOptions, TokioBackgroundTasks,
};

/// Core context plus the background runner that must be drained before exit.
pub struct ApplicationComponents {
    pub app_context: Arc<AppContext>,
    pub background: Arc<TokioBackgroundTasks>,
}

impl ApplicationComponents {
    /// Wait for deferred work (row-count refresh, snapshot mirroring).
    pub async fn shutdown(self) {
        let pending = self.background.pending();
        if pending > 0 {
            debug!("Waiting for {} background tasks", pending);
        }
        self.background.wait_idle().await;
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist. Environment overrides apply last, then `data_path`.
pub fn load_config(path: &Path, data_path: Option<&str>) -> Result<CoreConfig> {
    let mut config = if path.exists() {
        CoreConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        CoreConfig::default()
    };
    config.apply_env_overrides()?;
    if let Some(data_path) = data_path {
        config.storage.data_path = data_path.to_string();
    }
    config.finalize()?;
    Ok(config)
}

fn open_mirror(config: &CoreConfig) -> Result<Option<Arc<dyn ObjectStoragePort>>> {
    if !config.snapshots.mirror_enabled {
        return Ok(None);
    }
    let mirror: Arc<dyn ObjectStoragePort> = match config.snapshots.mirror_backend.as_str() {
        "memory" => Arc::new(ObjectStoreMirror::in_memory()),
        "local" => Arc::new(ObjectStoreMirror::local(&config.snapshots.mirror_path)?),
        other => anyhow::bail!("Unknown snapshot mirror backend '{}'", other),
    };
    info!(
        "Snapshot mirror: {} ({})",
        config.snapshots.mirror_backend, config.snapshots.mirror_path
    );
    Ok(Some(mirror))
}

/// Open the database, the optional snapshot mirror and the core context.
pub async fn bootstrap(config: &CoreConfig) -> Result<ApplicationComponents> {
    let phase_start = std::time::Instant::now();
    std::fs::create_dir_all(&config.storage.data_path)
        .with_context(|| format!("Failed to create {}", config.storage.data_path))?;

    let db_path = config.storage.database_path();
    let backend = SqliteBackend::open(
        &db_path,
        SqliteOptions {
            foreign_keys: config.storage.foreign_keys,
            busy_timeout_ms: config.storage.busy_timeout_ms,
        },
    )?;
    info!(
        "SQLite database opened at {} ({:.2}ms)",
        db_path.display(),
        phase_start.elapsed().as_secs_f64() * 1000.0
    );

    let mirror = open_mirror(config)?;
    let background = Arc::new(TokioBackgroundTasks::new());
    let app_context = AppContext::init(
        config.clone(),
        backend.into_shared(),
        mirror,
        background.clone(),
    )
    .await?;

    Ok(ApplicationComponents {
        app_context,
        background,
    })
}
