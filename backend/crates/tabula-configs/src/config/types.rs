use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub schema: SchemaSettings,
    #[serde(default)]
    pub limits: LimitsSettings,
    #[serde(default)]
    pub snapshots: SnapshotSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Base data directory
    /// Default: "./data"
    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// Database file name inside `data_path`
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Enforce foreign keys on the connection.
    /// Left off by default: recreation batches drop and rename tables that
    /// other tables may reference.
    #[serde(default)]
    pub foreign_keys: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StorageSettings {
    /// Full path of the database file (data_path/database_file)
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_path).join(&self.database_file)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            database_file: default_database_file(),
            foreign_keys: false,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Schema management settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Names protected in addition to the built-in system tables
    #[serde(default)]
    pub extra_protected_tables: Vec<String>,
    /// Table-name prefixes reserved by the engine
    #[serde(default = "default_reserved_prefixes")]
    pub reserved_prefixes: Vec<String>,
    /// Owner column added to private tables when not declared
    #[serde(default = "default_owner_column")]
    pub owner_column: String,
    /// Capture a `pre_change` snapshot before destructive structural changes
    #[serde(default = "default_true")]
    pub auto_snapshot: bool,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            extra_protected_tables: Vec::new(),
            reserved_prefixes: default_reserved_prefixes(),
            owner_column: default_owner_column(),
            auto_snapshot: true,
        }
    }
}

/// Limits settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl LimitsSettings {
    /// Clamp a requested page size to `[1, max_page_size]`.
    pub fn clamp_page_size(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_page_size)
    }
}

impl Default for LimitsSettings {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Snapshot mirroring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSettings {
    #[serde(default)]
    pub mirror_enabled: bool,
    /// "memory" or "local"
    #[serde(default = "default_mirror_backend")]
    pub mirror_backend: String,
    /// Root directory for the "local" backend
    #[serde(default = "default_mirror_path")]
    pub mirror_path: String,
    /// Key prefix for mirrored snapshot blobs
    #[serde(default = "default_mirror_prefix")]
    pub mirror_prefix: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            mirror_enabled: false,
            mirror_backend: default_mirror_backend(),
            mirror_path: default_mirror_path(),
            mirror_prefix: default_mirror_prefix(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for log files (default: "./logs")
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Optional per-target log level overrides
    /// [logging.targets]
    /// rusqlite = "warn"
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}
