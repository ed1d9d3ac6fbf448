//! Indexed-column search models.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::page::Record;
use crate::models::schema::DataType;

/// Comparison operator of a search predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOperator {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
    IsNull,
    IsNotNull,
}

impl SearchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOperator::Eq => "eq",
            SearchOperator::Lt => "lt",
            SearchOperator::Le => "le",
            SearchOperator::Gt => "gt",
            SearchOperator::Ge => "ge",
            SearchOperator::Ne => "ne",
            SearchOperator::IsNull => "is_null",
            SearchOperator::IsNotNull => "is_not_null",
        }
    }

    /// Whether the operator compares against a bound value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, SearchOperator::IsNull | SearchOperator::IsNotNull)
    }

    /// Whether the operator depends on ordering.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            SearchOperator::Lt | SearchOperator::Le | SearchOperator::Gt | SearchOperator::Ge
        )
    }
}

impl fmt::Display for SearchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One condition of a search; predicates are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPredicate {
    pub column: String,
    pub operator: SearchOperator,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl SearchPredicate {
    pub fn new(
        column: impl Into<String>,
        operator: SearchOperator,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::new(column, SearchOperator::Eq, Some(value.into()))
    }
}

/// Column eligible for search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchableColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// Page of search hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub data: Vec<Record>,
    pub total: u64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}
