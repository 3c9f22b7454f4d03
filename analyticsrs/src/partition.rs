//! Partition resolution for time-partitioned analytics tables.
//!
//! Physical partitions are yearly sub-tables named `<table>_<year>`. A query
//! carries a [`PartitionSet`] once [`assign_partitions`] has run; the source
//! clause is then either the base table, one partition, or a `union all` view
//! over several partitions.

use std::collections::BTreeSet;

use crate::config::TableSettings;
use crate::dialect::Dialect;
use crate::error::{AnalyticsError, Result};
use crate::models::DimensionalQuery;

pub type PartitionId = i32;

/// Alias of each partition inside a `union all` source view.
pub const PARTITION_ALIAS: &str = "ap";

/// Resolved partitions of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionSet {
    ids: BTreeSet<PartitionId>,
    skip: bool,
}

impl PartitionSet {
    pub fn new(ids: impl IntoIterator<Item = PartitionId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            skip: false,
        }
    }

    /// A set telling the resolver to read the base table directly.
    pub fn skipped() -> Self {
        Self {
            ids: BTreeSet::new(),
            skip: true,
        }
    }

    /// Partition ids in ascending order.
    pub fn ids(&self) -> &BTreeSet<PartitionId> {
        &self.ids
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn has_one(&self) -> bool {
        self.ids.len() == 1
    }

    pub fn has_multiple(&self) -> bool {
        self.ids.len() > 1
    }

    pub fn any(&self) -> Option<PartitionId> {
        self.ids.iter().next().copied()
    }
}

/// Knows which partitions physically exist for a table.
pub trait PartitionManager {
    /// `None` when the table is unknown, in which case no filtering applies.
    fn existing_partitions(&self, table: &str) -> Option<BTreeSet<PartitionId>>;
}

/// Build the FROM source for `query`: the base table, a single partition, or
/// a parenthesized `union all` over partitions in ascending id order.
pub fn resolve_source_clause(
    query: &DimensionalQuery,
    settings: &TableSettings,
    dialect: &dyn Dialect,
) -> Result<String> {
    let table = query.table_name();

    if !settings.partitioned {
        return Ok(table.to_string());
    }

    let partitions = query.partitions().ok_or_else(|| {
        AnalyticsError::Configuration(format!(
            "partitions of table {table} must be resolved before building its source clause"
        ))
    })?;

    if partitions.is_skipped() {
        return Ok(table.to_string());
    }

    let ids: Vec<PartitionId> = partitions.ids().iter().copied().collect();
    match ids.as_slice() {
        [] => Err(AnalyticsError::Configuration(format!(
            "no partitions resolved for partitioned table {table}"
        ))),
        [id] => Ok(dialect.partition_name(table, *id)),
        _ => {
            let selects: Vec<String> = ids
                .iter()
                .map(|id| {
                    format!(
                        "select {PARTITION_ALIAS}.* from {} as {PARTITION_ALIAS}",
                        dialect.partition_name(table, *id)
                    )
                })
                .collect();
            Ok(dialect.union_all(&selects))
        }
    }
}

/// Years covered by the query's periods and start/end date restriction.
fn query_years(query: &DimensionalQuery) -> BTreeSet<PartitionId> {
    use chrono::Datelike;

    let mut years: BTreeSet<PartitionId> = query.periods().iter().flat_map(|p| p.years()).collect();
    if let (Some(start), Some(end)) = (query.start_date(), query.end_date()) {
        years.extend(start.year()..=end.year());
    }
    if let Some((earliest, latest)) = query.first_or_last_window() {
        years.extend(earliest.year()..=latest.year());
    }
    years
}

/// Derive a copy of `query` carrying its resolved [`PartitionSet`].
pub fn assign_partitions(
    query: &DimensionalQuery,
    settings: &TableSettings,
    manager: &dyn PartitionManager,
) -> Result<DimensionalQuery> {
    let table = query.table_name();

    let partitions = if !settings.partitioned || settings.skip_partitioning {
        tracing::debug!(table = %table, "partitioning skipped by table settings");
        PartitionSet::skipped()
    } else {
        let mut years = query_years(query);
        if let Some(existing) = manager.existing_partitions(table) {
            years.retain(|year| existing.contains(year));
        }
        if years.is_empty() {
            tracing::debug!(table = %table, "no existing partition covers the query, reading base table");
            PartitionSet::skipped()
        } else {
            tracing::debug!(table = %table, partitions = ?years, "assigned partitions");
            PartitionSet::new(years)
        }
    };

    query.to_builder().partitions(partitions).build()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::models::Period;

    struct Existing(HashMap<String, BTreeSet<PartitionId>>);

    impl PartitionManager for Existing {
        fn existing_partitions(&self, table: &str) -> Option<BTreeSet<PartitionId>> {
            self.0.get(table).cloned()
        }
    }

    fn query_with(partitions: Option<PartitionSet>) -> DimensionalQuery {
        let builder = DimensionalQuery::builder("fact");
        match partitions {
            Some(p) => builder.partitions(p).build().unwrap(),
            None => builder.build().unwrap(),
        }
    }

    #[test]
    fn unpartitioned_table_reads_base_table() {
        let settings = TableSettings {
            partitioned: false,
            ..TableSettings::default()
        };
        let sql = resolve_source_clause(&query_with(None), &settings, &PostgresDialect).unwrap();
        assert_eq!(sql, "fact");
    }

    #[test]
    fn skipped_partitions_read_base_table() {
        let query = query_with(Some(PartitionSet::skipped()));
        let sql =
            resolve_source_clause(&query, &TableSettings::default(), &PostgresDialect).unwrap();
        assert_eq!(sql, "fact");
    }

    #[test]
    fn unresolved_partitions_are_a_configuration_error() {
        let err = resolve_source_clause(&query_with(None), &TableSettings::default(), &PostgresDialect)
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)));

        let empty = query_with(Some(PartitionSet::new([])));
        let err =
            resolve_source_clause(&empty, &TableSettings::default(), &PostgresDialect).unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)));
    }

    #[test]
    fn assigns_only_existing_partitions() {
        let query = DimensionalQuery::builder("fact")
            .period(Period::parse("2019").unwrap())
            .period(Period::parse("2021").unwrap())
            .build()
            .unwrap();
        let manager = Existing(HashMap::from([(
            "fact".to_string(),
            BTreeSet::from([2020, 2021]),
        )]));
        let assigned = assign_partitions(&query, &TableSettings::default(), &manager).unwrap();
        assert_eq!(assigned.partitions(), Some(&PartitionSet::new([2021])));
        assert!(query.partitions().is_none());
    }

    #[test]
    fn missing_partitions_fall_back_to_base_table() {
        let query = DimensionalQuery::builder("fact")
            .period(Period::parse("2015").unwrap())
            .build()
            .unwrap();
        let manager = Existing(HashMap::from([("fact".to_string(), BTreeSet::from([2021]))]));
        let assigned = assign_partitions(&query, &TableSettings::default(), &manager).unwrap();
        assert_eq!(assigned.partitions(), Some(&PartitionSet::skipped()));
    }

    #[test]
    fn date_range_spans_partitions() {
        let query = DimensionalQuery::builder("fact")
            .start_date(chrono::NaiveDate::from_ymd_opt(2020, 11, 1).unwrap())
            .end_date(chrono::NaiveDate::from_ymd_opt(2022, 2, 1).unwrap())
            .build()
            .unwrap();
        let assigned =
            assign_partitions(&query, &TableSettings::default(), &Existing(HashMap::new())).unwrap();
        assert_eq!(assigned.partitions(), Some(&PartitionSet::new([2020, 2021, 2022])));
    }

    #[test]
    fn last_value_reads_lookback_partitions() {
        let query = DimensionalQuery::builder("fact")
            .period(Period::parse("2021").unwrap())
            .aggregation(crate::models::Aggregation::Last)
            .build()
            .unwrap();
        let manager = Existing(HashMap::from([(
            "fact".to_string(),
            BTreeSet::from([2005, 2015, 2020, 2021]),
        )]));
        let assigned = assign_partitions(&query, &TableSettings::default(), &manager).unwrap();
        assert_eq!(
            assigned.partitions(),
            Some(&PartitionSet::new([2015, 2020, 2021]))
        );
    }

    #[test]
    fn skip_partitioning_setting_wins() {
        let query = DimensionalQuery::builder("fact")
            .period(Period::parse("2021").unwrap())
            .build()
            .unwrap();
        let settings = TableSettings {
            skip_partitioning: true,
            ..TableSettings::default()
        };
        let assigned = assign_partitions(&query, &settings, &Existing(HashMap::new())).unwrap();
        assert!(assigned.partitions().is_some_and(PartitionSet::is_skipped));
    }
}
