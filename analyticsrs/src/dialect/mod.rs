//! SQL dialect abstractions for different database engines.
//!
//! Each dialect is implemented in its own file.

use chrono::NaiveDate;

use crate::models::Aggregation;
use crate::partition::PartitionId;

/// Dialects render identifiers, literals and set operations.
/// Clause ordering lives in the query builder; the dialect only maps
/// logical constructs to SQL fragments.
pub trait Dialect {
    fn quote_ident(&self, ident: &str) -> String;

    fn render_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn render_date(&self, date: NaiveDate) -> String {
        format!("'{}'", date.format("%Y-%m-%d"))
    }

    fn render_number(&self, value: f64) -> String {
        value.to_string()
    }

    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            Aggregation::Sum => format!("sum({expr})"),
            Aggregation::Avg => format!("avg({expr})"),
            Aggregation::Count => format!("count({expr})"),
            Aggregation::Stddev => format!("stddev({expr})"),
            Aggregation::Variance => format!("variance({expr})"),
            Aggregation::Min => format!("min({expr})"),
            Aggregation::Max => format!("max({expr})"),
            // Rows are ranked to one value per period first, then summed.
            Aggregation::First | Aggregation::Last => format!("sum({expr})"),
            Aggregation::None => expr.to_string(),
        }
    }

    /// Physical name of one yearly partition of `table`.
    fn partition_name(&self, table: &str, partition: PartitionId) -> String {
        format!("{table}_{partition}")
    }

    /// Parenthesized `union all` of the given select statements.
    fn union_all(&self, selects: &[String]) -> String {
        format!("({})", selects.join(" union all "))
    }
}

mod duckdb;
pub use duckdb::DuckDbDialect;

mod postgres;
pub use postgres::PostgresDialect;
