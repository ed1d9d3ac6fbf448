//! SQLite implementation of the SQL storage port.
//!
//! A single connection guarded by a mutex. `batch` runs inside one
//! transaction, so a failing statement rolls back everything before it.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, ToSql};

use crate::storage_trait::{
    Result, Row, RunResult, SqlStorage, SqlValue, Statement, StorageCapabilities, StorageError,
};

/// Connection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
    /// `PRAGMA foreign_keys`
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            foreign_keys: false,
            busy_timeout_ms: 5000,
        }
    }
}

/// SQLite-backed storage.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    capabilities: StorageCapabilities,
    path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P, options: SqliteOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StorageError::Connection(format!("Failed to open {}: {}", path.display(), e))
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(map_sqlite_error)?;

        log::debug!("Opened SQLite database at {}", path.display());
        Self::configure(conn, options, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(options: SqliteOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("Failed to open in-memory db: {}", e)))?;
        Self::configure(conn, options, None)
    }

    fn configure(
        conn: Connection,
        options: SqliteOptions,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
            .map_err(map_sqlite_error)?;
        let fk = if options.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys = {};", fk))
            .map_err(map_sqlite_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
            capabilities: StorageCapabilities {
                rename_column: true,
                drop_column: true,
                alter_column_type: false,
                add_foreign_key: false,
            },
            path,
        })
    }

    /// Override the reported capabilities.
    ///
    /// Reporting none makes every column change take the recreation path,
    /// which is how an engine without in-place ALTER behaves.
    pub fn with_capabilities(mut self, capabilities: StorageCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn into_shared(self) -> Arc<dyn SqlStorage> {
        Arc::new(self)
    }
}

impl SqlStorage for SqliteBackend {
    fn run(&self, statement: &Statement) -> Result<RunResult> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(statement.sql()).map_err(map_sqlite_error)?;
        let changes = stmt
            .execute(params_from_iter(statement.params().iter()))
            .map_err(map_sqlite_error)?;
        Ok(RunResult {
            changes: changes as u64,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }

    fn all(&self, statement: &Statement) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(statement.sql()).map_err(map_sqlite_error)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>()
            .into();

        let mut rows = stmt
            .query(params_from_iter(statement.params().iter()))
            .map_err(map_sqlite_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(value_from_ref(row.get_ref(idx).map_err(map_sqlite_error)?));
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn batch(&self, statements: Vec<Statement>) -> Result<Vec<RunResult>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_sqlite_error)?;

        let mut results = Vec::with_capacity(statements.len());
        for (idx, statement) in statements.iter().enumerate() {
            let changes = tx
                .execute(statement.sql(), params_from_iter(statement.params().iter()))
                .map_err(|e| {
                    log::debug!("Batch statement {} failed, rolling back: {}", idx, e);
                    map_sqlite_error(e)
                })?;
            results.push(RunResult {
                changes: changes as u64,
                last_insert_rowid: tx.last_insert_rowid(),
            });
        }

        tx.commit().map_err(map_sqlite_error)?;
        Ok(results)
    }

    fn capabilities(&self) -> StorageCapabilities {
        self.capabilities
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

/// Maps SQLite errors to storage errors.
fn map_sqlite_error(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(message.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => {
            let text = err.to_string();
            // "table t already exists", "there is already an index named t"
            if text.contains("already exists") || text.contains("there is already a") {
                StorageError::AlreadyExists(text)
            } else {
                StorageError::Sql(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        SqliteBackend::open_in_memory(SqliteOptions::default()).unwrap()
    }

    #[test]
    fn test_run_all_first() {
        let db = backend();
        db.run(&db.prepare("CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER)"))
            .unwrap();
        let res = db
            .run(&db.prepare("INSERT INTO t (id, n) VALUES (?, ?)").bind("a").bind(1_i64))
            .unwrap();
        assert_eq!(res.changes, 1);

        let rows = db.all(&db.prepare("SELECT id, n FROM t")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id"), Some("a"));

        let none = db
            .first(&db.prepare("SELECT id FROM t WHERE id = ?").bind("zz"))
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_batch_is_atomic() {
        let db = backend();
        db.run(&db.prepare("CREATE TABLE t (id TEXT PRIMARY KEY)")).unwrap();

        let err = db
            .batch(vec![
                Statement::new("INSERT INTO t (id) VALUES ('x')"),
                Statement::new("INSERT INTO t (id) VALUES ('x')"),
            ])
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));

        let rows = db.all(&db.prepare("SELECT id FROM t")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_batch_rolls_back_ddl() {
        let db = backend();
        db.run(&db.prepare("CREATE TABLE keep (id TEXT)")).unwrap();

        let result = db.batch(vec![
            Statement::new("DROP TABLE keep"),
            Statement::new("SELECT * FROM no_such_table"),
        ]);
        assert!(result.is_err());

        let exists = db
            .first(&db.prepare("SELECT name FROM sqlite_master WHERE name = 'keep'"))
            .unwrap();
        assert!(exists.is_some());
    }

    #[test]
    fn test_duplicate_table_maps_to_already_exists() {
        let db = backend();
        db.run(&db.prepare("CREATE TABLE t (id TEXT)")).unwrap();
        let err = db.run(&db.prepare("CREATE TABLE t (id TEXT)")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn test_table_index_name_clash_maps_to_already_exists() {
        let db = backend();
        db.run(&db.prepare("CREATE TABLE t (id TEXT)")).unwrap();
        db.run(&db.prepare("CREATE INDEX idx_t ON t (id)")).unwrap();

        let err = db.run(&db.prepare("CREATE TABLE idx_t (id TEXT)")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)), "{:?}", err);

        let err = db.run(&db.prepare("CREATE INDEX t ON t (id)")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)), "{:?}", err);
    }

    #[test]
    fn test_open_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/tabula.db");
        let db = SqliteBackend::open(&path, SqliteOptions::default()).unwrap();
        db.run(&db.prepare("CREATE TABLE t (id TEXT)")).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_capabilities_override() {
        let db = backend().with_capabilities(StorageCapabilities::default());
        assert!(!db.capabilities().rename_column);
        assert!(backend().capabilities().rename_column);
    }
}
