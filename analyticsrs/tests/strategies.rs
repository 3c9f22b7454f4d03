//! Integration tests for the subquery strategy family.

use analytics_sql::query_builder::StrategyBase;
use analytics_sql::{
    AnalyticsError, DataItemRef, DimensionalQuery, MeasureCriteria, MeasureFilter, OrgUnitRef,
    PartitionSet, Period, PostgresDialect, SubqueryStrategy, TableSettings,
};

fn query(partitions: PartitionSet) -> DimensionalQuery {
    DimensionalQuery::builder("analytics")
        .data_item(DataItemRef::new("fbfJHSPpUQD"))
        .period(Period::parse("2021").unwrap())
        .organisation_unit(OrgUnitRef::root("ImspTQPwCqd"))
        .partitions(partitions)
        .build()
        .unwrap()
}

fn pre_measure(criteria: MeasureCriteria, partitions: PartitionSet) -> String {
    let settings = TableSettings::default();
    let base = StrategyBase::new(&PostgresDialect, &settings);
    SubqueryStrategy::PreMeasureCriteria { criteria }
        .build_subquery(&base, &query(partitions))
        .unwrap()
        .into_sql()
}

#[test]
fn empty_criteria_emit_no_where() {
    let sql = pre_measure(MeasureCriteria::new(), PartitionSet::skipped());
    assert_eq!(sql, "(SELECT * FROM analytics AS ax)");
    assert!(!sql.contains("WHERE"));
}

#[test]
fn single_criterion() {
    let sql = pre_measure(
        MeasureCriteria::new().with(MeasureFilter::Gt, 0.0),
        PartitionSet::skipped(),
    );
    assert_eq!(sql, "(SELECT * FROM analytics AS ax WHERE value > 0)");
}

#[test]
fn criteria_keep_insertion_order() {
    let sql = pre_measure(
        MeasureCriteria::new()
            .with(MeasureFilter::Gt, 0.0)
            .with(MeasureFilter::Le, 100.0),
        PartitionSet::skipped(),
    );
    assert!(sql.contains("WHERE value > 0 AND value <= 100"));

    let reversed = pre_measure(
        MeasureCriteria::new()
            .with(MeasureFilter::Le, 100.0)
            .with(MeasureFilter::Gt, 0.0),
        PartitionSet::skipped(),
    );
    assert!(reversed.contains("WHERE value <= 100 AND value > 0"));
}

#[test]
fn every_operator_maps_to_sql() {
    let sql = pre_measure(
        "EQ:1;GE:2;LT:3.5".parse().unwrap(),
        PartitionSet::skipped(),
    );
    assert!(sql.contains("WHERE value = 1 AND value >= 2 AND value < 3.5"));
}

#[test]
fn pre_measure_reads_partition_union() {
    let sql = pre_measure(
        MeasureCriteria::new().with(MeasureFilter::Gt, 0.0),
        PartitionSet::new([2021, 2022]),
    );
    assert_eq!(
        sql,
        "(SELECT * FROM (select ap.* from analytics_2021 as ap union all \
         select ap.* from analytics_2022 as ap) AS ax WHERE value > 0)"
    );
}

#[test]
fn min_max_groups_by_dimension_columns() {
    let settings = TableSettings::default();
    let base = StrategyBase::new(&PostgresDialect, &settings);
    let sql = SubqueryStrategy::MinMaxValue
        .build_subquery(&base, &query(PartitionSet::new([2021])))
        .unwrap()
        .into_sql();
    assert_eq!(
        sql,
        "(SELECT \"dx\", \"yearly\" AS \"pe\", \"uidlevel1\" AS \"ou\", \
         min(\"value\") AS \"minvalue\", max(\"value\") AS \"maxvalue\" \
         FROM analytics_2021 AS ax \
         WHERE \"dx\" IN ('fbfJHSPpUQD') AND \"uidlevel1\" IN ('ImspTQPwCqd') \
         AND \"yearly\" IN ('2021') AND \"year\" IN (2021) \
         GROUP BY \"dx\", \"yearly\", \"uidlevel1\")"
    );
}

#[test]
fn strategies_require_resolved_partitions() {
    let settings = TableSettings::default();
    let base = StrategyBase::new(&PostgresDialect, &settings);
    let unresolved = DimensionalQuery::builder("analytics")
        .data_item(DataItemRef::new("fbfJHSPpUQD"))
        .build()
        .unwrap();

    for strategy in [
        SubqueryStrategy::MinMaxValue,
        SubqueryStrategy::PreMeasureCriteria {
            criteria: MeasureCriteria::new(),
        },
    ] {
        let err = strategy.build_subquery(&base, &unresolved).unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)));
        assert!(!err.is_client_error());
    }
}
