use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

/// Runs generated SQL against the analytics database. Implemented by the
/// caller; timeouts and retries belong to the implementation.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_sql(&self, sql: &str) -> Result<QueryResult>;
}
