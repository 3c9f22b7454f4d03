//! SQL assembly for dimensional analytics queries.
//!
//! The builder only concatenates: strategy selection, partition resolution
//! and security narrowing have already happened on the query it receives.

use crate::config::TableSettings;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::DimensionalQuery;

mod assembler;
mod columns;
mod strategy;
mod where_clause;

pub use assembler::SqlStatement;
pub use columns::{
    org_unit_columns, physical_columns, ColumnGenerator, DimensionColumn, OrgUnitColumns,
};
pub use strategy::{
    RankDirection, StrategyBase, SubqueryFragment, SubqueryStrategy, SOURCE_ALIAS,
};
pub use where_clause::WhereClauseBuilder;

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlBuilder;

impl SqlBuilder {
    /// Aggregate statement: one row per dimension combination.
    pub fn aggregate_statement(
        &self,
        query: &DimensionalQuery,
        settings: &TableSettings,
        dialect: &dyn Dialect,
    ) -> Result<SqlStatement> {
        let base = StrategyBase::new(dialect, settings);
        let columns = base.columns();
        let where_clause = base.where_clause();

        let strategy = SubqueryStrategy::for_query(query)?;
        let from = match &strategy {
            Some(strategy) => format!(
                "{} AS {SOURCE_ALIAS}",
                strategy.build_subquery(&base, query)?
            ),
            None => base.source(query)?,
        };

        let dimensions = columns.dimension_columns(query)?;
        let mut select: Vec<String> = dimensions.iter().map(|c| c.select.clone()).collect();
        select.push(columns.value_column(query));

        let mut filters = where_clause.dimension_conditions(query)?;
        match strategy {
            // The ranked subquery already bounds dates and partitions.
            Some(SubqueryStrategy::FirstOrLastValue { .. }) => {
                filters.push(where_clause.rank_condition());
            }
            _ => {
                filters.extend(where_clause.period_conditions(query)?);
                filters.extend(where_clause.partition_condition(query));
            }
        }

        let mut group_by: Vec<String> = dimensions.into_iter().filter_map(|c| c.group_by).collect();
        group_by.extend(columns.value_group_by(query));

        let having = if query.is_numeric() && query.aggregation().is_aggregating() {
            let value = columns.aggregate_value_expr(query);
            query
                .measure_criteria()
                .iter()
                .map(|(filter, threshold)| {
                    format!(
                        "{value} {} {}",
                        filter.sql_operator(),
                        dialect.render_number(threshold)
                    )
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(SqlStatement {
            select,
            from,
            filters,
            group_by,
            having,
        })
    }

    pub fn build_aggregate_sql(
        &self,
        query: &DimensionalQuery,
        settings: &TableSettings,
        dialect: &dyn Dialect,
    ) -> Result<String> {
        let sql = self.aggregate_statement(query, settings, dialect)?.render();
        tracing::debug!(table = %query.table_name(), sql = %sql, "built aggregate sql");
        Ok(sql)
    }

    /// Minimum and maximum observed value per dimension combination.
    pub fn build_min_max_sql(
        &self,
        query: &DimensionalQuery,
        settings: &TableSettings,
        dialect: &dyn Dialect,
    ) -> Result<String> {
        let base = StrategyBase::new(dialect, settings);
        let fragment = SubqueryStrategy::MinMaxValue.build_subquery(&base, query)?;
        let sql = format!("SELECT * FROM {fragment} AS {}", dialect.quote_ident("minmax"));
        tracing::debug!(table = %query.table_name(), sql = %sql, "built min/max sql");
        Ok(sql)
    }
}
