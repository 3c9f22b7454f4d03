use std::collections::BTreeMap;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::{
    Aggregation, DimensionalQuery, OrgUnitMode, OrgUnitRef, DATA_X_DIM_ID, ORGUNIT_DIM_ID,
    PERIOD_DIM_ID,
};

use super::where_clause::in_list;

pub const ORG_UNIT_LEVEL_PREFIX: &str = "uidlevel";
pub const ENROLLMENT_LEVEL_PREFIX: &str = "enrollmentuidlevel";
pub const PERIOD_START_COLUMN: &str = "pestartdate";
pub const PERIOD_END_COLUMN: &str = "peenddate";
pub const PARTITION_COLUMN: &str = "year";
pub const RANK_COLUMN: &str = "pe_rank";
pub const MIN_VALUE_ALIAS: &str = "minvalue";
pub const MAX_VALUE_ALIAS: &str = "maxvalue";

/// Physical columns backing the organisation units of one hierarchy level:
/// rows are grouped by `output` and restricted to `uids` on `filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUnitColumns {
    pub output: String,
    pub filter: String,
    pub uids: Vec<String>,
}

pub fn org_unit_level_column(level: usize) -> String {
    format!("{ORG_UNIT_LEVEL_PREFIX}{level}")
}

pub fn enrollment_level_column(level: usize) -> String {
    format!("{ENROLLMENT_LEVEL_PREFIX}{level}")
}

/// Uids grouped under their level column, ascending by level.
pub fn level_groups<'q>(
    units: impl IntoIterator<Item = &'q OrgUnitRef>,
    column: fn(usize) -> String,
) -> Vec<(String, Vec<&'q str>)> {
    let mut by_level: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for unit in units {
        by_level.entry(unit.level()).or_default().push(unit.uid.as_str());
    }
    by_level
        .into_iter()
        .map(|(level, uids)| (column(level), uids))
        .collect()
}

/// Column groups for the organisation-unit dimension under the query's mode,
/// one per hierarchy level. Empty without organisation units or in ALL mode.
pub fn org_unit_columns(query: &DimensionalQuery) -> Vec<OrgUnitColumns> {
    let units = query.organisation_units();
    match query.org_unit_mode() {
        _ if units.is_empty() => Vec::new(),
        OrgUnitMode::All => Vec::new(),
        OrgUnitMode::Selected => vec![OrgUnitColumns {
            output: ORGUNIT_DIM_ID.to_string(),
            filter: ORGUNIT_DIM_ID.to_string(),
            uids: units.iter().map(|u| u.uid.clone()).collect(),
        }],
        mode => {
            let mut by_level: BTreeMap<usize, Vec<String>> = BTreeMap::new();
            for unit in units {
                by_level.entry(unit.level()).or_default().push(unit.uid.clone());
            }
            by_level
                .into_iter()
                .map(|(level, uids)| {
                    let output = match mode {
                        OrgUnitMode::Children => org_unit_level_column(level + 1),
                        _ => org_unit_level_column(level),
                    };
                    OrgUnitColumns {
                        output,
                        filter: org_unit_level_column(level),
                        uids,
                    }
                })
                .collect()
        }
    }
}

/// Every physical dimension column the query reads.
pub fn physical_columns(query: &DimensionalQuery) -> Result<Vec<String>> {
    let mut columns = Vec::new();
    let mut push = |column: String| {
        if !columns.contains(&column) {
            columns.push(column);
        }
    };
    if !query.data_items().is_empty() {
        push(DATA_X_DIM_ID.to_string());
    }
    if let Some(period_type) = query.uniform_period_type()? {
        push(period_type.column_name().to_string());
    }
    for ou in org_unit_columns(query) {
        push(ou.filter);
        push(ou.output);
    }
    for (column, _) in level_groups(query.org_unit_filters(), org_unit_level_column) {
        push(column);
    }
    for (column, _) in level_groups(query.enrollment_org_units(), enrollment_level_column) {
        push(column);
    }
    for dimension in query.dimensions() {
        push(dimension.id.clone());
    }
    for id in query.filters().keys() {
        push(id.clone());
    }
    Ok(columns)
}

/// One select-list entry of a dimension; `group_by` is `None` for constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionColumn {
    pub select: String,
    pub group_by: Option<String>,
}

pub struct ColumnGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> ColumnGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    fn aliased(&self, column: &str, alias: &str) -> DimensionColumn {
        let quoted = self.dialect.quote_ident(column);
        let select = if column == alias {
            quoted.clone()
        } else {
            format!("{quoted} AS {}", self.dialect.quote_ident(alias))
        };
        DimensionColumn {
            select,
            group_by: Some(quoted),
        }
    }

    /// Output dimension columns in fixed order: data, period, organisation
    /// unit, then additional dimensions as requested.
    pub fn dimension_columns(&self, query: &DimensionalQuery) -> Result<Vec<DimensionColumn>> {
        let mut columns = Vec::new();

        if !query.data_items().is_empty() {
            columns.push(self.aliased(DATA_X_DIM_ID, DATA_X_DIM_ID));
        }

        if let Some(period_type) = query.uniform_period_type()? {
            if query.aggregation().is_first_or_last() {
                // Ranked rows come from several periods; report the requested one.
                if let Some(period) = query.latest_period() {
                    columns.push(DimensionColumn {
                        select: format!(
                            "{} AS {}",
                            self.dialect.render_literal(&period.iso),
                            self.dialect.quote_ident(PERIOD_DIM_ID)
                        ),
                        group_by: None,
                    });
                }
            } else {
                columns.push(self.aliased(period_type.column_name(), PERIOD_DIM_ID));
            }
        }

        match org_unit_columns(query).as_slice() {
            [] => {}
            [single] => columns.push(self.aliased(&single.output, ORGUNIT_DIM_ID)),
            levels => {
                // Units on several levels: report each row under the
                // requested unit of its own level.
                let branches: Vec<String> = levels
                    .iter()
                    .map(|ou| {
                        format!(
                            "WHEN {} THEN {}",
                            in_list(self.dialect, &ou.filter, ou.uids.iter().map(String::as_str)),
                            self.dialect.quote_ident(&ou.output)
                        )
                    })
                    .collect();
                let case = format!("CASE {} END", branches.join(" "));
                columns.push(DimensionColumn {
                    select: format!("{case} AS {}", self.dialect.quote_ident(ORGUNIT_DIM_ID)),
                    group_by: Some(case),
                });
            }
        }

        for dimension in query.dimensions() {
            columns.push(self.aliased(&dimension.id, &dimension.id));
        }

        Ok(columns)
    }

    /// Aggregate expression over the value column, without alias.
    pub fn aggregate_value_expr(&self, query: &DimensionalQuery) -> String {
        let value = self.dialect.quote_ident(query.value_column());
        if query.is_numeric() {
            self.dialect.render_aggregation(&query.aggregation(), &value)
        } else {
            value
        }
    }

    pub fn value_column(&self, query: &DimensionalQuery) -> String {
        format!(
            "{} AS {}",
            self.aggregate_value_expr(query),
            self.dialect.quote_ident(query.value_column())
        )
    }

    /// Group-by entry for the raw value when it is not aggregated.
    pub fn value_group_by(&self, query: &DimensionalQuery) -> Option<String> {
        if query.is_numeric() && query.aggregation().is_aggregating() {
            None
        } else {
            Some(self.dialect.quote_ident(query.value_column()))
        }
    }

    pub fn min_max_value_columns(&self, query: &DimensionalQuery) -> Vec<String> {
        let value = self.dialect.quote_ident(query.value_column());
        vec![
            format!(
                "{} AS {}",
                self.dialect.render_aggregation(&Aggregation::Min, &value),
                self.dialect.quote_ident(MIN_VALUE_ALIAS)
            ),
            format!(
                "{} AS {}",
                self.dialect.render_aggregation(&Aggregation::Max, &value),
                self.dialect.quote_ident(MAX_VALUE_ALIAS)
            ),
        ]
    }
}
