// Default value functions
pub fn default_true() -> bool {
    true
}

pub fn default_data_path() -> String {
    "./data".to_string() // Normalized to absolute at runtime
}

pub fn default_database_file() -> String {
    "tabula.db".to_string()
}

pub fn default_busy_timeout_ms() -> u64 {
    5000
}

pub fn default_owner_column() -> String {
    "user_id".to_string()
}

pub fn default_reserved_prefixes() -> Vec<String> {
    vec!["sqlite_".to_string(), "_cf_".to_string()]
}

pub fn default_page_size() -> u32 {
    50
}

pub fn default_max_page_size() -> u32 {
    1000
}

pub fn default_mirror_backend() -> String {
    "memory".to_string()
}

pub fn default_mirror_path() -> String {
    "./data/snapshots".to_string()
}

pub fn default_mirror_prefix() -> String {
    "schema-snapshots".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_logs_path() -> String {
    "./logs".to_string()
}
