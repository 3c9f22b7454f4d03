use crate::config::AnalyticsConfig;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::DimensionalQuery;
use crate::partition::{assign_partitions, PartitionManager};
use crate::query_builder::SqlBuilder;
use crate::security::{decide_access, with_user_constraints, Principal};
use crate::validation::QueryValidator;

/// Turns raw queries into security-constrained, partition-aware SQL.
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    tables: Box<dyn PartitionManager + Send + Sync>,
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl AnalyticsEngine {
    pub fn new(
        config: AnalyticsConfig,
        tables: impl PartitionManager + Send + Sync + 'static,
        dialect: impl Dialect + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            tables: Box::new(tables),
            dialect: Box::new(dialect),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Access check, constraint injection, validation and partition
    /// assignment. The input query is left untouched.
    pub fn prepare(
        &self,
        query: &DimensionalQuery,
        principal: &Principal,
    ) -> Result<DimensionalQuery> {
        let settings = self.config.for_table(query.table_name());

        decide_access(query, principal)?;
        let constrained = with_user_constraints(query, principal)?;
        QueryValidator::new(&settings).validate(&constrained)?;
        assign_partitions(&constrained, &settings, self.tables.as_ref())
    }

    pub fn aggregate_sql(&self, query: &DimensionalQuery, principal: &Principal) -> Result<String> {
        let prepared = self.prepare(query, principal)?;
        let settings = self.config.for_table(prepared.table_name());
        SqlBuilder.build_aggregate_sql(&prepared, &settings, self.dialect())
    }

    pub fn min_max_sql(&self, query: &DimensionalQuery, principal: &Principal) -> Result<String> {
        let prepared = self.prepare(query, principal)?;
        let settings = self.config.for_table(prepared.table_name());
        SqlBuilder.build_min_max_sql(&prepared, &settings, self.dialect())
    }
}
