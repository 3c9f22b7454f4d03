use futures::future::try_join_all;

use crate::engine::AnalyticsEngine;
use crate::error::Result;
use crate::executor::{QueryExecutor, QueryResult};
use crate::models::DimensionalQuery;
use crate::security::IdentityProvider;

/// Build the aggregate SQL for the current principal and hand it to the executor.
pub async fn run_query(
    engine: &AnalyticsEngine,
    identity: &dyn IdentityProvider,
    executor: &dyn QueryExecutor,
    query: &DimensionalQuery,
) -> Result<QueryResult> {
    let principal = identity.principal()?;
    let sql = engine.aggregate_sql(query, &principal)?;
    tracing::debug!(user = %principal.username, table = %query.table_name(), "executing analytics query");
    executor.execute_sql(&sql).await
}

/// Run several queries for the same principal concurrently; the first failure
/// aborts the batch.
pub async fn run_queries(
    engine: &AnalyticsEngine,
    identity: &dyn IdentityProvider,
    executor: &dyn QueryExecutor,
    queries: &[DimensionalQuery],
) -> Result<Vec<QueryResult>> {
    let principal = identity.principal()?;
    let statements = queries
        .iter()
        .map(|query| engine.aggregate_sql(query, &principal))
        .collect::<Result<Vec<_>>>()?;
    try_join_all(statements.iter().map(|sql| executor.execute_sql(sql))).await
}
