//! Records and pagination.

use serde::{Deserialize, Serialize};

/// A row as exchanged with callers: column name → JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Paging and ordering of a table listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: SortOrder,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u64) -> Self {
        Self {
            limit,
            offset,
            sort_by: None,
            sort_order: SortOrder::Asc,
        }
    }

    pub fn sorted(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(column.into());
        self.sort_order = order;
        self
    }
}

/// Page of records with the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    pub data: Vec<Record>,
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
}

impl RecordPage {
    pub fn empty(limit: u32, offset: u64) -> Self {
        Self {
            data: Vec::new(),
            total: 0,
            limit,
            offset,
        }
    }

    pub fn has_more(&self) -> bool {
        self.offset + (self.data.len() as u64) < self.total
    }
}
