//! Guarded raw SQL execution.
//!
//! Raw queries are limited to a single SELECT statement that does not
//! mention any protected table. The scan is word-level, so a protected name
//! is rejected wherever it appears (identifier, quoted identifier, string
//! literal), which errs on the side of refusing.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tabula_commons::{ProtectedTables, Record};
use tabula_store::{SqlStorage, SqlStorageAsync, Statement};

use crate::error::{Result, TabulaError};

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_$]*").expect("word pattern is a valid regex"));

static FIRST_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:--[^\n]*\n\s*|/\*.*?\*/\s*)*([A-Za-z]+)")
        .expect("keyword pattern is a valid regex")
});

#[derive(Debug, Clone)]
pub struct SqlGuard {
    protected: ProtectedTables,
}

impl SqlGuard {
    pub fn new(protected: ProtectedTables) -> Self {
        Self { protected }
    }

    /// Check a raw query; returns the statement text without a trailing `;`.
    pub fn check<'a>(&self, sql: &'a str) -> Result<&'a str> {
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        if trimmed.is_empty() {
            return Err(TabulaError::unsupported("Empty query"));
        }
        if trimmed.contains(';') {
            return Err(TabulaError::unsupported(
                "Only a single statement can be executed",
            ));
        }

        let first = FIRST_KEYWORD_RE
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if !first.eq_ignore_ascii_case("SELECT") {
            return Err(TabulaError::unsupported(
                "Only SELECT statements can be executed",
            ));
        }

        if let Some(word) = WORD_RE
            .find_iter(trimmed)
            .map(|m| m.as_str())
            .find(|w| self.protected.is_protected(w))
        {
            log::warn!("❌ Raw query blocked: references protected table '{}'", word);
            return Err(TabulaError::SystemTableProtected(word.to_string()));
        }
        Ok(trimmed)
    }
}

pub struct RawQueryExecutor {
    storage: Arc<dyn SqlStorage>,
    guard: SqlGuard,
}

impl RawQueryExecutor {
    pub fn new(storage: Arc<dyn SqlStorage>, guard: SqlGuard) -> Self {
        Self { storage, guard }
    }

    pub async fn execute_sql(&self, sql: &str) -> Result<Vec<Record>> {
        let statement = self.guard.check(sql)?;
        let rows = self
            .storage
            .all_async(Statement::new(statement))
            .await?;
        log::debug!("Raw query returned {} rows", rows.len());
        Ok(rows.iter().map(|r| r.to_json_map()).collect())
    }
}
