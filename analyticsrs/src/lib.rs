pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod partition;
pub mod query_builder;
pub mod registry;
pub mod runtime;
pub mod security;
pub mod validation;

use std::path::Path;

use crate::error::Result;

/// Load the table registry under `table_dir` and settings from the default
/// locations, and build an engine targeting `dialect`.
pub fn load_engine<P, D>(table_dir: P, dialect: D) -> Result<AnalyticsEngine>
where
    P: AsRef<Path>,
    D: dialect::Dialect + Send + Sync + 'static,
{
    let tables = TableRegistry::load_from_dir(table_dir)?;
    Ok(AnalyticsEngine::new(
        config::AnalyticsConfig::load_default(),
        tables,
        dialect,
    ))
}

pub use config::{AnalyticsConfig, TableSettings};
pub use dialect::{Dialect, DuckDbDialect, PostgresDialect};
pub use engine::AnalyticsEngine;
pub use error::{AnalyticsError, ErrorCategory};
pub use executor::{QueryExecutor, QueryResult};
pub use models::{
    Aggregation, DataItemRef, DataType, DimensionalQuery, MeasureCriteria, MeasureFilter,
    OrgUnitHierarchy, OrgUnitMode, OrgUnitProvider, OrgUnitRef, Period, QueryRequest,
};
pub use partition::{PartitionManager, PartitionSet};
pub use query_builder::{SqlBuilder, SubqueryFragment, SubqueryStrategy};
pub use registry::TableRegistry;
pub use security::{IdentityProvider, Principal};
pub use validation::QueryValidator;
