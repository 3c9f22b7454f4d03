//! PostgreSQL dialect implementation.

use chrono::NaiveDate;

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn render_date(&self, date: NaiveDate) -> String {
        // Compared against date columns, so the plain literal is coerced.
        format!("'{}'", date.format("%Y-%m-%d"))
    }
}
