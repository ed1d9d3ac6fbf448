//! Schema descriptors and schema-change requests.
//!
//! Descriptors are the structured source of truth for table shape. They are
//! built from the storage engine's reflection views and DDL text is generated
//! from them; generated text is never parsed back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared column type.
///
/// Known names map to dedicated variants; anything else is kept verbatim in
/// `Other` so recreation reproduces the original declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    Text,
    Integer,
    Real,
    Boolean,
    Blob,
    Other(String),
}

/// Storage affinity derived from a declared type (SQLite rules plus BOOLEAN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeAffinity {
    Text,
    Integer,
    Real,
    Boolean,
    Blob,
    Numeric,
}

impl DataType {
    /// Parse a declared type. Never fails; unknown declarations become `Other`.
    pub fn parse(declared: &str) -> Self {
        let trimmed = declared.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "TEXT" => DataType::Text,
            "INTEGER" => DataType::Integer,
            "REAL" => DataType::Real,
            "BOOLEAN" => DataType::Boolean,
            "BLOB" => DataType::Blob,
            _ => DataType::Other(trimmed.to_string()),
        }
    }

    /// SQL type name used in DDL.
    pub fn sql_name(&self) -> &str {
        match self {
            DataType::Text => "TEXT",
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Boolean => "BOOLEAN",
            DataType::Blob => "BLOB",
            DataType::Other(raw) => raw.as_str(),
        }
    }

    /// Affinity the engine applies to values stored under this declaration.
    pub fn affinity(&self) -> TypeAffinity {
        match self {
            DataType::Text => TypeAffinity::Text,
            DataType::Integer => TypeAffinity::Integer,
            DataType::Real => TypeAffinity::Real,
            DataType::Boolean => TypeAffinity::Boolean,
            DataType::Blob => TypeAffinity::Blob,
            DataType::Other(raw) => {
                let upper = raw.to_ascii_uppercase();
                if upper.contains("INT") {
                    TypeAffinity::Integer
                } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
                    TypeAffinity::Text
                } else if upper.contains("BOOL") {
                    TypeAffinity::Boolean
                } else if upper.is_empty() || upper.contains("BLOB") {
                    TypeAffinity::Blob
                } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
                    TypeAffinity::Real
                } else {
                    TypeAffinity::Numeric
                }
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.affinity(), TypeAffinity::Integer | TypeAffinity::Real)
    }
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        DataType::parse(&value)
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.sql_name().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Bare keywords accepted as column defaults.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "CURRENT_TIMESTAMP",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "NULL",
    "TRUE",
    "FALSE",
];

/// Default value specification.
///
/// The three non-empty shapes serialize differently and must not be
/// conflated: literals are quoted, keywords are bare, expressions are wrapped
/// in parentheses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ColumnDefault {
    #[default]
    None,
    /// String literal, stored unquoted (`hello` → `'hello'`)
    Literal(String),
    /// Numeric literal, kept verbatim (`0`, `-1.5`)
    Number(String),
    /// Bare keyword (`CURRENT_TIMESTAMP`)
    Keyword(String),
    /// Function-call or other expression, stored without the outer parentheses
    Expression(String),
}

impl ColumnDefault {
    pub fn literal(value: impl Into<String>) -> Self {
        ColumnDefault::Literal(value.into())
    }

    pub fn keyword(value: impl Into<String>) -> Self {
        ColumnDefault::Keyword(value.into().to_ascii_uppercase())
    }

    pub fn expression(value: impl Into<String>) -> Self {
        ColumnDefault::Expression(value.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ColumnDefault::None)
    }

    /// Interpret the raw default text reported by the engine's reflection
    /// (`PRAGMA table_info.dflt_value`).
    pub fn from_reflection(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return ColumnDefault::None;
        };

        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            return ColumnDefault::Literal(raw[1..raw.len() - 1].replace("''", "'"));
        }
        if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            return ColumnDefault::Literal(raw[1..raw.len() - 1].replace("\"\"", "\""));
        }
        if raw.starts_with('(') && raw.ends_with(')') && outer_parens_enclose(raw) {
            return ColumnDefault::Expression(raw[1..raw.len() - 1].trim().to_string());
        }
        if raw.parse::<f64>().is_ok() {
            return ColumnDefault::Number(raw.to_string());
        }
        let upper = raw.to_ascii_uppercase();
        if DEFAULT_KEYWORDS.contains(&upper.as_str()) {
            return ColumnDefault::Keyword(upper);
        }
        if raw.contains('(') {
            return ColumnDefault::Expression(raw.to_string());
        }
        ColumnDefault::Keyword(raw.to_string())
    }

    /// SQL text following `DEFAULT`; empty for `None`.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnDefault::None => String::new(),
            ColumnDefault::Literal(v) => format!("'{}'", v.replace('\'', "''")),
            ColumnDefault::Number(v) | ColumnDefault::Keyword(v) => v.clone(),
            ColumnDefault::Expression(v) => format!("({})", v),
        }
    }
}

/// True when the first '(' is closed by the final ')'.
fn outer_parens_enclose(raw: &str) -> bool {
    let mut depth = 0i32;
    let last = raw.len() - 1;
    for (idx, ch) in raw.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && idx != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Whether a table belongs to the platform or to the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    System,
    User,
}

/// Row visibility policy of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    /// No row filtering for any caller kind
    #[default]
    Public,
    /// Rows visible to and mutable by their owner only (admins unrestricted)
    Private,
    /// Platform-managed; only elevated callers
    System,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessPolicy::Public => "public",
            AccessPolicy::Private => "private",
            AccessPolicy::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Some(AccessPolicy::Public),
            "private" => Some(AccessPolicy::Private),
            "system" => Some(AccessPolicy::System),
            _ => None,
        }
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub kind: TableKind,
    /// Raw `CREATE TABLE` text as stored by the engine
    pub sql: String,
    /// Last known row count; `None` until the background probe has run
    pub row_count: Option<u64>,
    pub access_policy: AccessPolicy,
    /// Column holding the creating caller's id (private tables)
    pub owner_column: Option<String>,
}

/// Column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Zero-based position in the table
    pub ordinal: u32,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default_value: ColumnDefault,
    pub primary_key: bool,
    /// Single-column UNIQUE constraint
    #[serde(default)]
    pub unique: bool,
}

/// Foreign key declared on a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Index as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Raw `CREATE INDEX` text; engine-created indexes have none
    pub sql: Option<String>,
}

impl IndexDescriptor {
    pub fn is_single_column(&self) -> bool {
        self.columns.len() == 1
    }
}

/// Target of a foreign key in a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    pub table: String,
    pub column: String,
}

impl ForeignKeyTarget {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Column definition supplied by callers to `create_table`/`add_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default_value: ColumnDefault,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub references: Option<ForeignKeyTarget>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// Nullable column without default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default_value: ColumnDefault::None,
            unique: false,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default_value: ColumnDefault) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyTarget::new(table, column));
        self
    }
}

/// Options for `create_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CreateTableOptions {
    #[serde(default)]
    pub access_policy: AccessPolicy,
    /// Owner column for private tables; defaults to the configured name
    #[serde(default)]
    pub owner_column: Option<String>,
}

impl CreateTableOptions {
    pub fn private() -> Self {
        Self {
            access_policy: AccessPolicy::Private,
            owner_column: None,
        }
    }

    pub fn private_with_owner(owner_column: impl Into<String>) -> Self {
        Self {
            access_policy: AccessPolicy::Private,
            owner_column: Some(owner_column.into()),
        }
    }
}

/// Requested foreign-key change on a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ForeignKeyChange {
    Add { references: ForeignKeyTarget },
    Remove,
}

/// Requested modification of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnChangeRequest {
    #[serde(default, rename = "type")]
    pub data_type: Option<DataType>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyChange>,
}

impl ColumnChangeRequest {
    pub fn is_empty(&self) -> bool {
        self.data_type.is_none() && self.nullable.is_none() && self.foreign_key.is_none()
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn add_foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyChange::Add {
            references: ForeignKeyTarget::new(table, column),
        });
        self
    }

    pub fn remove_foreign_key(mut self) -> Self {
        self.foreign_key = Some(ForeignKeyChange::Remove);
        self
    }
}

/// Outcome of the pre-flight column-change checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub conflicting_rows: u64,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            conflicting_rows: 0,
        }
    }

    /// Record a failure; `rows` is added to the conflicting-row count.
    pub fn fail(&mut self, message: impl Into<String>, rows: u64) {
        self.valid = false;
        self.errors.push(message.into());
        self.conflicting_rows += rows;
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("text"), DataType::Text);
        assert_eq!(DataType::parse(" INTEGER "), DataType::Integer);
        assert_eq!(DataType::parse("VARCHAR(20)"), DataType::Other("VARCHAR(20)".into()));
        assert_eq!(DataType::parse("VARCHAR(20)").sql_name(), "VARCHAR(20)");
    }

    #[test]
    fn test_affinity() {
        assert_eq!(DataType::parse("VARCHAR(20)").affinity(), TypeAffinity::Text);
        assert_eq!(DataType::parse("BIGINT").affinity(), TypeAffinity::Integer);
        assert_eq!(DataType::parse("DOUBLE").affinity(), TypeAffinity::Real);
        assert_eq!(DataType::parse("").affinity(), TypeAffinity::Blob);
        assert_eq!(DataType::parse("DECIMAL(10,2)").affinity(), TypeAffinity::Numeric);
        assert!(DataType::Real.is_numeric());
        assert!(!DataType::Text.is_numeric());
    }

    #[test]
    fn test_default_from_reflection() {
        assert_eq!(ColumnDefault::from_reflection(None), ColumnDefault::None);
        assert_eq!(
            ColumnDefault::from_reflection(Some("'it''s'")),
            ColumnDefault::Literal("it's".into())
        );
        assert_eq!(
            ColumnDefault::from_reflection(Some("CURRENT_TIMESTAMP")),
            ColumnDefault::Keyword("CURRENT_TIMESTAMP".into())
        );
        assert_eq!(
            ColumnDefault::from_reflection(Some("current_timestamp")),
            ColumnDefault::Keyword("CURRENT_TIMESTAMP".into())
        );
        assert_eq!(
            ColumnDefault::from_reflection(Some("(datetime('now'))")),
            ColumnDefault::Expression("datetime('now')".into())
        );
        assert_eq!(
            ColumnDefault::from_reflection(Some("-1.5")),
            ColumnDefault::Number("-1.5".into())
        );
        // Not wrapped by a single outer pair
        assert_eq!(
            ColumnDefault::from_reflection(Some("(1) + (2)")),
            ColumnDefault::Expression("(1) + (2)".into())
        );
    }

    #[test]
    fn test_default_round_trip_is_stable() {
        for raw in ["'open'", "CURRENT_TIMESTAMP", "(datetime('now'))", "0", "(lower(hex(randomblob(16))))"] {
            let parsed = ColumnDefault::from_reflection(Some(raw));
            let emitted = parsed.to_sql();
            assert_eq!(ColumnDefault::from_reflection(Some(&emitted)), parsed, "{}", raw);
            assert_eq!(emitted, raw);
        }
    }

    #[test]
    fn test_column_spec_deserialize_defaults() {
        let spec: ColumnSpec = serde_json::from_str(r#"{"name":"title","type":"TEXT"}"#).unwrap();
        assert!(spec.nullable);
        assert_eq!(spec.data_type, DataType::Text);
        assert!(spec.default_value.is_none());
    }

    #[test]
    fn test_validation_result_fail() {
        let mut result = ValidationResult::ok();
        result.fail("3 rows have NULL", 3);
        result.fail("2 rows do not coerce", 2);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.conflicting_rows, 5);
    }
}
