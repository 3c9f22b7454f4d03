//! DuckDB dialect implementation.

use chrono::NaiveDate;

use crate::models::Aggregation;

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct DuckDbDialect;

impl Dialect for DuckDbDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn render_date(&self, date: NaiveDate) -> String {
        format!("DATE '{}'", date.format("%Y-%m-%d"))
    }

    fn render_aggregation(&self, agg: &Aggregation, expr: &str) -> String {
        match agg {
            Aggregation::Stddev => format!("stddev_samp({expr})"),
            Aggregation::Variance => format!("var_samp({expr})"),
            Aggregation::Sum => format!("sum({expr})"),
            Aggregation::Avg => format!("avg({expr})"),
            Aggregation::Count => format!("count({expr})"),
            Aggregation::Min => format!("min({expr})"),
            Aggregation::Max => format!("max({expr})"),
            Aggregation::First | Aggregation::Last => format!("sum({expr})"),
            Aggregation::None => expr.to_string(),
        }
    }
}
