use super::types::CoreConfig;
use crate::file_helpers::normalize_dir_path;
use std::fs;
use std::path::Path;

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl CoreConfig {
    /// Load configuration from a TOML file
    ///
    /// Note: Environment overrides are applied separately via `apply_env_overrides()`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and finalize it.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: CoreConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.finalize()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TABULA_DATA_PATH: Override storage.data_path
    /// - TABULA_LOG_LEVEL: Override logging.level
    /// - TABULA_LOG_TO_CONSOLE: Override logging.log_to_console
    ///
    /// Environment variables take precedence over config file values.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        use std::env;

        if let Ok(path) = env::var("TABULA_DATA_PATH") {
            if path.trim().is_empty() {
                return Err(anyhow::anyhow!("TABULA_DATA_PATH cannot be empty"));
            }
            self.storage.data_path = path;
        }

        if let Ok(level) = env::var("TABULA_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Ok(val) = env::var("TABULA_LOG_TO_CONSOLE") {
            self.logging.log_to_console =
                val.eq_ignore_ascii_case("true") || val == "1" || val.eq_ignore_ascii_case("yes");
        }

        Ok(())
    }

    /// Normalize directory-like paths to absolute paths.
    fn normalize_paths(&mut self) {
        self.storage.data_path = normalize_dir_path(&self.storage.data_path);
        self.logging.logs_path = normalize_dir_path(&self.logging.logs_path);
        self.snapshots.mirror_path = normalize_dir_path(&self.snapshots.mirror_path);
    }

    /// Normalize local filesystem paths and validate configuration.
    ///
    /// Call this after applying environment overrides.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.normalize_paths();

        self.validate()?;

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.database_file.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.database_file cannot be empty"));
        }

        // Validate log level
        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ));
        }

        // Validate log format
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        for (target, level) in &self.logging.targets {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    VALID_LEVELS.join(", ")
                ));
            }
        }

        // Validate page limits
        if self.limits.max_page_size == 0 {
            return Err(anyhow::anyhow!("max_page_size cannot be 0"));
        }
        if self.limits.default_page_size == 0 {
            return Err(anyhow::anyhow!("default_page_size cannot be 0"));
        }
        if self.limits.default_page_size > self.limits.max_page_size {
            return Err(anyhow::anyhow!(
                "default_page_size ({}) cannot exceed max_page_size ({})",
                self.limits.default_page_size,
                self.limits.max_page_size
            ));
        }

        if self.schema.owner_column.trim().is_empty() {
            return Err(anyhow::anyhow!("schema.owner_column cannot be empty"));
        }

        let valid_backends = ["memory", "local"];
        if !valid_backends.contains(&self.snapshots.mirror_backend.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid snapshot mirror backend '{}'. Must be one of: {}",
                self.snapshots.mirror_backend,
                valid_backends.join(", ")
            ));
        }

        if self.snapshots.mirror_enabled && self.snapshots.mirror_prefix.trim().is_empty() {
            log::warn!("Snapshot mirroring enabled with an empty key prefix");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = CoreConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_page_size_exceeds_max() {
        let mut config = CoreConfig::default();
        config.limits.default_page_size = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_mirror_backend() {
        let mut config = CoreConfig::default();
        config.snapshots.mirror_backend = "s3".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config.schema.owner_column, "user_id");
        assert_eq!(config.limits.default_page_size, 50);
        assert_eq!(config.limits.max_page_size, 1000);
        assert!(config.schema.auto_snapshot);
        assert!(!config.storage.foreign_keys);
        assert_eq!(config.schema.reserved_prefixes, vec!["sqlite_", "_cf_"]);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
database_file = "app.db"

[schema]
extra_protected_tables = ["audit_log"]
owner_column = "owner_id"

[limits]
max_page_size = 200

[logging]
level = "debug"

[logging.targets]
rusqlite = "warn"
"#
        )
        .unwrap();

        let config = CoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.storage.database_file, "app.db");
        assert_eq!(config.schema.extra_protected_tables, vec!["audit_log"]);
        assert_eq!(config.schema.owner_column, "owner_id");
        assert_eq!(config.limits.max_page_size, 200);
        assert_eq!(config.logging.targets.get("rusqlite").map(String::as_str), Some("warn"));
        assert!(Path::new(&config.storage.data_path).is_absolute());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(CoreConfig::from_file("/nonexistent/tabula.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("TABULA_LOG_LEVEL", "DEBUG");
        env::set_var("TABULA_DATA_PATH", "/tmp/tabula-env");
        let mut config = CoreConfig::default();
        config.apply_env_overrides().unwrap();
        env::remove_var("TABULA_LOG_LEVEL");
        env::remove_var("TABULA_DATA_PATH");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.data_path, "/tmp/tabula-env");
        assert!(config.validate().is_ok());
    }
}
