use once_cell::sync::Lazy;
use regex::Regex;
use tabula_commons::{
    validate_identifier, ColumnDefault, ColumnSpec, DataType, IdentifierKind, ProtectedTables,
    DEFAULT_KEYWORDS,
};

use crate::error::{Result, TabulaError};

/// Declared types outside the known set: a type name, optionally followed by
/// a size such as `(255)` or `(10, 2)`.
static OTHER_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*( [A-Za-z][A-Za-z0-9_]*)*(\s*\(\s*\d+\s*(,\s*\d+\s*)?\))?$")
        .expect("type pattern is a valid regex")
});

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d+(\.\d+)?([eE][+-]?\d+)?$").expect("number pattern is a valid regex")
});

/// Guards every structural request before any statement text is built.
///
/// The protected-name check runs before the identifier check, so a protected
/// name always reports `SystemTableProtected` whatever else is wrong with the
/// request.
#[derive(Debug, Clone)]
pub struct NameValidator {
    protected: ProtectedTables,
}

impl NameValidator {
    pub fn new(protected: ProtectedTables) -> Self {
        Self { protected }
    }

    pub fn protected_tables(&self) -> &ProtectedTables {
        &self.protected
    }

    pub fn is_protected(&self, table: &str) -> bool {
        self.protected.is_protected(table)
    }

    /// Reject protected names, then malformed ones.
    pub fn ensure_user_table(&self, table: &str, operation: &str) -> Result<()> {
        if self.protected.is_protected(table) {
            log::warn!(
                "❌ {} on '{}' blocked: protected system table",
                operation,
                table
            );
            return Err(TabulaError::SystemTableProtected(table.to_string()));
        }
        validate_identifier(IdentifierKind::Table, table)?;
        Ok(())
    }

    pub fn validate_column_name(&self, name: &str) -> Result<()> {
        validate_identifier(IdentifierKind::Column, name)?;
        Ok(())
    }

    pub fn validate_index_name(&self, name: &str) -> Result<()> {
        validate_identifier(IdentifierKind::Index, name)?;
        Ok(())
    }

    pub fn validate_data_type(&self, data_type: &DataType) -> Result<()> {
        match data_type {
            DataType::Other(raw) if !raw.is_empty() && !OTHER_TYPE_RE.is_match(raw) => Err(
                TabulaError::invalid_input(format!("Unsupported column type '{}'", raw)),
            ),
            _ => Ok(()),
        }
    }

    /// Defaults are spliced into DDL text, so anything beyond a single
    /// balanced expression is refused.
    pub fn validate_default(&self, column: &str, default_value: &ColumnDefault) -> Result<()> {
        let bad = |reason: &str| {
            Err(TabulaError::invalid_input(format!(
                "Invalid default for column '{}': {}",
                column, reason
            )))
        };

        match default_value {
            ColumnDefault::None | ColumnDefault::Literal(_) => Ok(()),
            ColumnDefault::Number(raw) if NUMBER_RE.is_match(raw) => Ok(()),
            ColumnDefault::Number(raw) => bad(&format!("'{}' is not a number", raw)),
            ColumnDefault::Keyword(raw) => {
                if DEFAULT_KEYWORDS.contains(&raw.to_ascii_uppercase().as_str()) {
                    Ok(())
                } else {
                    bad(&format!("unknown keyword '{}'", raw))
                }
            }
            ColumnDefault::Expression(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return bad("empty expression");
                }
                if trimmed.contains(';') || trimmed.contains("--") || trimmed.contains("/*") {
                    return bad("expression must be a single term");
                }
                if !parens_balanced(trimmed) {
                    return bad("unbalanced parentheses");
                }
                Ok(())
            }
        }
    }

    /// Full check of a caller-supplied column definition.
    pub fn validate_column_spec(&self, spec: &ColumnSpec) -> Result<()> {
        self.validate_column_name(&spec.name)?;
        self.validate_data_type(&spec.data_type)?;
        self.validate_default(&spec.name, &spec.default_value)?;
        if let Some(target) = &spec.references {
            validate_identifier(IdentifierKind::Table, &target.table)?;
            validate_identifier(IdentifierKind::Column, &target.column)?;
        }
        Ok(())
    }
}

fn parens_balanced(raw: &str) -> bool {
    let mut depth = 0i32;
    let mut in_quote = false;
    for ch in raw.chars() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quote
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> NameValidator {
        NameValidator::new(ProtectedTables::default())
    }

    #[test]
    fn test_protected_check_runs_first() {
        let v = validator();
        assert!(matches!(
            v.ensure_user_table("users", "DROP TABLE"),
            Err(TabulaError::SystemTableProtected(_))
        ));
        assert!(matches!(
            v.ensure_user_table("sqlite_sequence", "ALTER TABLE"),
            Err(TabulaError::SystemTableProtected(_))
        ));
        assert!(matches!(
            v.ensure_user_table("Schema_Snapshots", "CREATE TABLE"),
            Err(TabulaError::SystemTableProtected(_))
        ));
        assert!(matches!(
            v.ensure_user_table("1orders", "CREATE TABLE"),
            Err(TabulaError::InvalidIdentifier { .. })
        ));
        assert!(v.ensure_user_table("orders", "CREATE TABLE").is_ok());
    }

    #[test]
    fn test_data_types() {
        let v = validator();
        assert!(v.validate_data_type(&DataType::Text).is_ok());
        assert!(v.validate_data_type(&DataType::parse("VARCHAR(255)")).is_ok());
        assert!(v.validate_data_type(&DataType::parse("DECIMAL(10, 2)")).is_ok());
        assert!(v.validate_data_type(&DataType::parse("DOUBLE PRECISION")).is_ok());
        assert!(v
            .validate_data_type(&DataType::parse("TEXT); DROP TABLE x; --"))
            .is_err());
    }

    #[test]
    fn test_defaults() {
        let v = validator();
        assert!(v.validate_default("a", &ColumnDefault::literal("it's")).is_ok());
        assert!(v.validate_default("a", &ColumnDefault::Number("-1.5".into())).is_ok());
        assert!(v.validate_default("a", &ColumnDefault::Number("abc".into())).is_err());
        assert!(v.validate_default("a", &ColumnDefault::keyword("current_timestamp")).is_ok());
        assert!(v.validate_default("a", &ColumnDefault::keyword("NOW")).is_err());
        assert!(v
            .validate_default("a", &ColumnDefault::expression("datetime('now', 'localtime')"))
            .is_ok());
        assert!(v
            .validate_default("a", &ColumnDefault::expression("1); DROP TABLE t"))
            .is_err());
        assert!(v.validate_default("a", &ColumnDefault::expression("lower(('x')")).is_err());
    }

    #[test]
    fn test_column_spec() {
        let v = validator();
        assert!(v
            .validate_column_spec(&ColumnSpec::new("owner", DataType::Text).references("users", "id"))
            .is_ok());
        assert!(matches!(
            v.validate_column_spec(&ColumnSpec::new("bad name", DataType::Text)),
            Err(TabulaError::InvalidIdentifier { .. })
        ));
        assert!(v
            .validate_column_spec(&ColumnSpec::new("x", DataType::Text).references("users", "i d"))
            .is_err());
    }
}
