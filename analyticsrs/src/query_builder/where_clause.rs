use crate::config::TableSettings;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::{DimensionalQuery, DATA_X_DIM_ID};

use super::columns::{
    enrollment_level_column, level_groups, org_unit_columns, org_unit_level_column,
    PARTITION_COLUMN, PERIOD_END_COLUMN, PERIOD_START_COLUMN, RANK_COLUMN,
};

/// `"column" IN ('a', 'b')` with every item rendered as a literal.
pub fn in_list<'i>(
    dialect: &dyn Dialect,
    column: &str,
    items: impl IntoIterator<Item = &'i str>,
) -> String {
    let literals: Vec<String> = items
        .into_iter()
        .map(|item| dialect.render_literal(item))
        .collect();
    format!("{} IN ({})", dialect.quote_ident(column), literals.join(", "))
}

/// OR-combine alternatives, parenthesised when there is more than one.
fn any_of(alternatives: Vec<String>) -> Option<String> {
    match alternatives.as_slice() {
        [] => None,
        [single] => Some(single.clone()),
        _ => Some(format!("({})", alternatives.join(" OR "))),
    }
}

/// Produces the row conditions of a query; callers join them with `AND`.
pub struct WhereClauseBuilder<'a> {
    dialect: &'a dyn Dialect,
    settings: &'a TableSettings,
}

impl<'a> WhereClauseBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect, settings: &'a TableSettings) -> Self {
        Self { dialect, settings }
    }

    fn in_list<'i>(&self, column: &str, items: impl IntoIterator<Item = &'i str>) -> String {
        in_list(self.dialect, column, items)
    }

    /// Conditions on data items, organisation units and other dimensions.
    pub fn dimension_conditions(&self, query: &DimensionalQuery) -> Result<Vec<String>> {
        let mut conditions = Vec::new();

        if !query.data_items().is_empty() {
            conditions.push(self.in_list(
                DATA_X_DIM_ID,
                query.data_items().iter().map(|d| d.uid.as_str()),
            ));
        }

        let org_units = org_unit_columns(query)
            .iter()
            .map(|ou| self.in_list(&ou.filter, ou.uids.iter().map(String::as_str)))
            .collect();
        conditions.extend(any_of(org_units));

        // Filter units restrict rows to their subtree.
        let filter_units = level_groups(query.org_unit_filters(), org_unit_level_column)
            .into_iter()
            .map(|(column, uids)| self.in_list(&column, uids))
            .collect();
        conditions.extend(any_of(filter_units));

        let enrollment = level_groups(query.enrollment_org_units(), enrollment_level_column)
            .into_iter()
            .map(|(column, uids)| self.in_list(&column, uids))
            .collect();
        conditions.extend(any_of(enrollment));

        for dimension in query.dimensions() {
            if !dimension.items.is_empty() {
                conditions.push(self.in_list(
                    &dimension.id,
                    dimension.items.iter().map(String::as_str),
                ));
            }
        }

        for (dimension, items) in query.filters() {
            if items.is_empty() {
                continue;
            }
            if !self.settings.is_indexed(dimension) {
                tracing::debug!(dimension = %dimension, "filtering on a dimension without index");
            }
            conditions.push(self.in_list(dimension, items.iter().map(String::as_str)));
        }

        Ok(conditions)
    }

    /// Conditions on the period column and the start/end date restriction.
    pub fn period_conditions(&self, query: &DimensionalQuery) -> Result<Vec<String>> {
        let mut conditions = Vec::new();

        if let Some(period_type) = query.uniform_period_type()? {
            conditions.push(self.in_list(
                period_type.column_name(),
                query.periods().iter().map(|p| p.iso.as_str()),
            ));
        }
        if let Some(start) = query.start_date() {
            conditions.push(self.date_bound(PERIOD_START_COLUMN, ">=", start));
        }
        if let Some(end) = query.end_date() {
            conditions.push(self.date_bound(PERIOD_END_COLUMN, "<=", end));
        }

        Ok(conditions)
    }

    pub fn date_bound(&self, column: &str, operator: &str, date: chrono::NaiveDate) -> String {
        format!(
            "{} {operator} {}",
            self.dialect.quote_ident(column),
            self.dialect.render_date(date)
        )
    }

    /// `"year" IN (...)` over resolved partitions, letting the planner
    /// exclude partitions the query does not touch.
    pub fn partition_condition(&self, query: &DimensionalQuery) -> Option<String> {
        let partitions = query.partitions()?;
        if partitions.is_skipped() || partitions.is_empty() {
            return None;
        }
        let years: Vec<String> = partitions.ids().iter().map(|id| id.to_string()).collect();
        Some(format!(
            "{} IN ({})",
            self.dialect.quote_ident(PARTITION_COLUMN),
            years.join(", ")
        ))
    }

    pub fn rank_condition(&self) -> String {
        format!("{} = 1", self.dialect.quote_ident(RANK_COLUMN))
    }
}
