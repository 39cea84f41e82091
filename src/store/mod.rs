//! Remote database service capability.
//!
//! SYSTEM CONTEXT
//! ==============
//! The data-access services consume persistence; they never implement it.
//! [`RemoteStore`] is the seam: [`supabase::SupabaseStore`] talks to the
//! hosted PostgREST endpoint, tests substitute in-memory tables.

pub mod supabase;

use serde_json::Value;

use crate::error::NetworkError;

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { column: column.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Row selection on one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
    /// Ask the service for the exact total of matching rows.
    pub count: bool,
}

impl SelectQuery {
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    #[must_use]
    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// Selected rows and, when requested, the total matching count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectResult {
    pub rows: Vec<Value>,
    pub total_count: Option<u64>,
}

/// Table-level CRUD against the database service.
///
/// `token` is the caller's access token; `None` means anonymous access.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: &str, query: &SelectQuery, token: Option<&str>) -> Result<SelectResult, NetworkError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Value, token: Option<&str>) -> Result<Value, NetworkError>;

    /// Update matching rows and return them as stored.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        token: Option<&str>,
    ) -> Result<Vec<Value>, NetworkError>;
}
