//! Subquery strategies: each builds one parenthesized source fragment for an
//! aggregation need. Strategies return text and never execute anything.

use std::fmt;

use chrono::NaiveDate;

use crate::config::TableSettings;
use crate::dialect::Dialect;
use crate::error::{AnalyticsError, Result};
use crate::models::{
    Aggregation, DimensionalQuery, MeasureCriteria, DATA_X_DIM_ID, ORGUNIT_DIM_ID,
};
use crate::partition::resolve_source_clause;

use super::assembler::SqlStatement;
use super::columns::{ColumnGenerator, PERIOD_END_COLUMN, PERIOD_START_COLUMN, RANK_COLUMN};
use super::where_clause::WhereClauseBuilder;

/// Alias of the fact source in every generated statement.
pub const SOURCE_ALIAS: &str = "ax";

/// Columns identifying one value series when ranking FIRST/LAST values.
const RANK_PARTITION_COLUMNS: [&str; 4] = [DATA_X_DIM_ID, ORGUNIT_DIM_ID, "co", "ao"];

/// Already-escaped SQL clause produced by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubqueryFragment {
    sql: String,
}

impl SubqueryFragment {
    fn new(sql: String) -> Self {
        Self { sql }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn into_sql(self) -> String {
        self.sql
    }
}

impl fmt::Display for SubqueryFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankDirection {
    /// FIRST: earliest period wins.
    Ascending,
    /// LAST: latest period wins.
    Descending,
}

impl RankDirection {
    fn keyword(&self) -> &'static str {
        match self {
            RankDirection::Ascending => "ASC",
            RankDirection::Descending => "DESC",
        }
    }
}

fn require_partitions(query: &DimensionalQuery) -> Result<()> {
    if query.partitions().is_none() {
        return Err(AnalyticsError::Configuration(format!(
            "partitions of table {} must be resolved before building subqueries",
            query.table_name()
        )));
    }
    Ok(())
}

/// Collaborators shared by every strategy.
pub struct StrategyBase<'a> {
    dialect: &'a dyn Dialect,
    settings: &'a TableSettings,
}

impl<'a> StrategyBase<'a> {
    pub fn new(dialect: &'a dyn Dialect, settings: &'a TableSettings) -> Self {
        Self { dialect, settings }
    }

    pub fn columns(&self) -> ColumnGenerator<'a> {
        ColumnGenerator::new(self.dialect)
    }

    pub fn where_clause(&self) -> WhereClauseBuilder<'a> {
        WhereClauseBuilder::new(self.dialect, self.settings)
    }

    pub fn table_partition_or_table_name(&self, query: &DimensionalQuery) -> Result<String> {
        require_partitions(query)?;
        resolve_source_clause(query, self.settings, self.dialect)
    }

    /// The aliased source, ready to follow `FROM`.
    pub fn source(&self, query: &DimensionalQuery) -> Result<String> {
        Ok(format!(
            "{} AS {SOURCE_ALIAS}",
            self.table_partition_or_table_name(query)?
        ))
    }

    /// Minimum and maximum value per dimension combination.
    pub fn min_max_statement(&self, query: &DimensionalQuery) -> Result<SqlStatement> {
        let columns = self.columns();
        let where_clause = self.where_clause();
        let dimensions = columns.dimension_columns(query)?;

        let mut select: Vec<String> = dimensions.iter().map(|c| c.select.clone()).collect();
        select.extend(columns.min_max_value_columns(query));

        let mut filters = where_clause.dimension_conditions(query)?;
        filters.extend(where_clause.period_conditions(query)?);
        filters.extend(where_clause.partition_condition(query));

        Ok(SqlStatement {
            select,
            from: self.source(query)?,
            filters,
            group_by: dimensions.into_iter().filter_map(|c| c.group_by).collect(),
            having: Vec::new(),
        })
    }

    /// Raw rows passing the numeric thresholds, in criteria order.
    fn pre_measure_criteria_statement(
        &self,
        query: &DimensionalQuery,
        criteria: &MeasureCriteria,
    ) -> Result<SqlStatement> {
        // The value column is a validated identifier.
        let filters = criteria
            .iter()
            .map(|(filter, threshold)| {
                format!(
                    "{} {} {}",
                    query.value_column(),
                    filter.sql_operator(),
                    self.dialect.render_number(threshold)
                )
            })
            .collect();

        Ok(SqlStatement {
            select: vec!["*".to_string()],
            from: self.source(query)?,
            filters,
            ..SqlStatement::default()
        })
    }

    /// Rows within the window, ranked per series by period end then start date.
    fn first_or_last_statement(
        &self,
        query: &DimensionalQuery,
        direction: RankDirection,
        earliest: NaiveDate,
        latest: NaiveDate,
    ) -> Result<SqlStatement> {
        let where_clause = self.where_clause();
        let order = direction.keyword();

        let partition_by: Vec<String> = RANK_PARTITION_COLUMNS
            .iter()
            .filter(|column| self.settings.has_column(column))
            .map(|column| self.dialect.quote_ident(column))
            .collect();
        let rank = format!(
            "row_number() OVER (PARTITION BY {} ORDER BY {} {order}, {} {order}) AS {}",
            partition_by.join(", "),
            self.dialect.quote_ident(PERIOD_END_COLUMN),
            self.dialect.quote_ident(PERIOD_START_COLUMN),
            self.dialect.quote_ident(RANK_COLUMN)
        );

        let mut filters = vec![
            where_clause.date_bound(PERIOD_START_COLUMN, ">=", earliest),
            where_clause.date_bound(PERIOD_END_COLUMN, "<=", latest),
            format!("{} IS NOT NULL", self.dialect.quote_ident(query.value_column())),
        ];
        filters.extend(where_clause.partition_condition(query));

        Ok(SqlStatement {
            select: vec![format!("{SOURCE_ALIAS}.*"), rank],
            from: self.source(query)?,
            filters,
            ..SqlStatement::default()
        })
    }
}

/// Closed family of subquery strategies.
#[derive(Debug, Clone, PartialEq)]
pub enum SubqueryStrategy {
    MinMaxValue,
    PreMeasureCriteria {
        criteria: MeasureCriteria,
    },
    FirstOrLastValue {
        direction: RankDirection,
        earliest: NaiveDate,
        latest: NaiveDate,
    },
}

impl SubqueryStrategy {
    /// Strategy feeding the aggregate statement's FROM clause, if any.
    /// FIRST/LAST takes precedence over pre-aggregate criteria.
    pub fn for_query(query: &DimensionalQuery) -> Result<Option<Self>> {
        if query.aggregation().is_first_or_last() {
            let (earliest, latest) = query.first_or_last_window().ok_or_else(|| {
                AnalyticsError::IllegalQuery(
                    "FIRST/LAST aggregation requires a period or an end date".to_string(),
                )
            })?;
            let direction = match query.aggregation() {
                Aggregation::First => RankDirection::Ascending,
                _ => RankDirection::Descending,
            };
            return Ok(Some(SubqueryStrategy::FirstOrLastValue {
                direction,
                earliest,
                latest,
            }));
        }

        if query.is_numeric() && !query.pre_aggregate_measure_criteria().is_empty() {
            return Ok(Some(SubqueryStrategy::PreMeasureCriteria {
                criteria: query.pre_aggregate_measure_criteria().clone(),
            }));
        }

        Ok(None)
    }

    pub fn id(&self) -> &'static str {
        match self {
            SubqueryStrategy::MinMaxValue => "min_max_value",
            SubqueryStrategy::PreMeasureCriteria { .. } => "pre_measure_criteria",
            SubqueryStrategy::FirstOrLastValue { .. } => "first_or_last_value",
        }
    }

    pub fn build_subquery(
        &self,
        base: &StrategyBase<'_>,
        query: &DimensionalQuery,
    ) -> Result<SubqueryFragment> {
        require_partitions(query)?;

        let statement = match self {
            SubqueryStrategy::MinMaxValue => base.min_max_statement(query)?,
            SubqueryStrategy::PreMeasureCriteria { criteria } => {
                base.pre_measure_criteria_statement(query, criteria)?
            }
            SubqueryStrategy::FirstOrLastValue {
                direction,
                earliest,
                latest,
            } => base.first_or_last_statement(query, *direction, *earliest, *latest)?,
        };

        tracing::debug!(strategy = self.id(), table = %query.table_name(), "built subquery");
        Ok(SubqueryFragment::new(format!("({statement})")))
    }
}
