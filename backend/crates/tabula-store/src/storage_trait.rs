//! SQL storage port.
//!
//! The core reaches the underlying SQL engine only through this narrow
//! interface: prepared statements with positional parameters, three ways to
//! execute one (`run`, `all`, `first`) and an all-or-nothing `batch`.
//! There is no transaction primitive beyond `batch`; every multi-step
//! structural change must be expressed as exactly one batch call.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use tabula_store::storage_trait::{SqlStorage, Statement};
//!
//! fn count_rows<S: SqlStorage>(storage: &S) -> tabula_store::Result<i64> {
//!     let row = storage.first(&storage.prepare("SELECT COUNT(*) AS n FROM orders"))?;
//!     Ok(row.and_then(|r| r.get_i64("n")).unwrap_or(0))
//! }
//! ```
//!
//! ## Implementing a Custom Backend
//!
//! A backend maps `Statement` onto its native prepare/bind/execute calls and
//! must guarantee that `batch` either applies every statement or none. It
//! reports which in-place ALTER forms it supports through `capabilities()`;
//! the default reports none, which routes every column change through table
//! recreation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Connection could not be opened or configured
    Connection(String),

    /// Statement failed to prepare or execute
    Sql(String),

    /// Constraint violation (UNIQUE, NOT NULL, CHECK, FOREIGN KEY)
    ConstraintViolation(String),

    /// Object (table, index) already exists
    AlreadyExists(String),

    /// Operation not supported by this backend
    Unsupported(String),

    /// Serialization/deserialization error
    SerializationError(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Connection(msg) => write!(f, "Connection error: {}", msg),
            StorageError::Sql(msg) => write!(f, "SQL error: {}", msg),
            StorageError::ConstraintViolation(msg) => {
                write!(f, "Constraint violation: {}", msg)
            }
            StorageError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            StorageError::Unsupported(msg) => write!(f, "Unsupported operation: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::Other(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// A single SQL value, either bound as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Convert a JSON value for binding.
    ///
    /// Booleans become 0/1; arrays and objects are stored as JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        }
    }

    /// Convert to JSON; blobs are rendered as lowercase hex.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(v) => Value::from(*v),
            SqlValue::Real(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Blob(bytes) => {
                Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect())
            }
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Real(v as f64))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        SqlValue::Text(v.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One result row with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    pub fn get_string(&self, column: &str) -> Option<String> {
        self.get_str(column).map(str::to_string)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn get_bool(&self, column: &str) -> bool {
        self.get_i64(column).map(|v| v != 0).unwrap_or(false)
    }

    /// Convert to a JSON object keyed by column name.
    pub fn to_json_map(&self) -> serde_json::Map<String, Value> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect()
    }
}

/// Prepared statement: SQL text plus bound positional parameters.
///
/// Binding is by value; a statement can be built once and executed through
/// `run`, `all`, `first` or as part of a `batch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next positional parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Bind several positional parameters in order.
    pub fn bind_all<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunResult {
    /// Rows changed by the statement
    pub changes: u64,
    pub last_insert_rowid: i64,
}

/// In-place ALTER forms the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageCapabilities {
    /// `ALTER TABLE .. RENAME COLUMN`
    pub rename_column: bool,
    /// `ALTER TABLE .. DROP COLUMN` (plain columns only)
    pub drop_column: bool,
    /// In-place type or nullability change
    pub alter_column_type: bool,
    /// Adding a foreign key to an existing column
    pub add_foreign_key: bool,
}

/// Trait for SQL storage backends.
///
/// Implementations must be thread-safe (Send + Sync) to allow concurrent access.
///
/// ## Error Handling
///
/// Implementations should:
/// - Return `ConstraintViolation` for constraint failures
/// - Return `AlreadyExists` when creating an object whose name is taken
/// - Return `Sql` for any other statement failure
pub trait SqlStorage: Send + Sync {
    /// Start a statement.
    fn prepare(&self, sql: &str) -> Statement {
        Statement::new(sql)
    }

    /// Execute a statement that returns no rows.
    fn run(&self, statement: &Statement) -> Result<RunResult>;

    /// Execute a query and collect every row.
    fn all(&self, statement: &Statement) -> Result<Vec<Row>>;

    /// Execute a query and return its first row, if any.
    fn first(&self, statement: &Statement) -> Result<Option<Row>> {
        Ok(self.all(statement)?.into_iter().next())
    }

    /// Execute statements atomically.
    ///
    /// Either all statements succeed or none are applied.
    fn batch(&self, statements: Vec<Statement>) -> Result<Vec<RunResult>>;

    /// In-place ALTER forms supported by this backend.
    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities::default()
    }

    /// Downcast support for integration paths that need concrete backends.
    fn as_any(&self) -> &dyn Any;
}

/// Extension trait providing async versions of SqlStorage methods.
///
/// These methods internally use `tokio::task::spawn_blocking` to offload
/// synchronous storage calls to a blocking thread pool.
#[async_trait::async_trait]
pub trait SqlStorageAsync: Send + Sync {
    async fn run_async(&self, statement: Statement) -> Result<RunResult>;

    async fn all_async(&self, statement: Statement) -> Result<Vec<Row>>;

    async fn first_async(&self, statement: Statement) -> Result<Option<Row>>;

    async fn batch_async(&self, statements: Vec<Statement>) -> Result<Vec<RunResult>>;
}

// Blanket implementation for Arc<dyn SqlStorage>
#[async_trait::async_trait]
impl SqlStorageAsync for Arc<dyn SqlStorage> {
    async fn run_async(&self, statement: Statement) -> Result<RunResult> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.run(&statement))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn all_async(&self, statement: Statement) -> Result<Vec<Row>> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.all(&statement))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn first_async(&self, statement: Statement) -> Result<Option<Row>> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.first(&statement))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }

    async fn batch_async(&self, statements: Vec<Statement>) -> Result<Vec<RunResult>> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.batch(statements))
            .await
            .map_err(|e| StorageError::Other(format!("spawn_blocking join error: {}", e)))?
    }
}
