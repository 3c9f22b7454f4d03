use crate::config::TableSettings;
use crate::error::{AnalyticsError, Result};
use crate::models::DimensionalQuery;
use crate::query_builder::physical_columns;

/// Structural checks run on the constrained query before any SQL is built.
pub struct QueryValidator<'a> {
    settings: &'a TableSettings,
}

impl<'a> QueryValidator<'a> {
    pub fn new(settings: &'a TableSettings) -> Self {
        Self { settings }
    }

    pub fn validate(&self, query: &DimensionalQuery) -> Result<()> {
        self.check(
            !query.data_items().is_empty(),
            "at least one data item must be specified".to_string(),
        )?;

        self.check(
            !query.org_unit_mode().requires_explicit_units()
                || query.has_org_unit_dimension()
                || query.has_org_unit_filter(),
            format!(
                "organisation unit mode {:?} requires at least one organisation unit",
                query.org_unit_mode()
            ),
        )?;

        query.uniform_period_type()?;

        if query.aggregation().is_first_or_last() {
            self.check(
                query.periods().len() <= 1,
                "FIRST/LAST aggregation supports a single period".to_string(),
            )?;
            self.check(
                query.latest_end_date().is_some(),
                "FIRST/LAST aggregation requires a period or an end date".to_string(),
            )?;
        }

        if !query.is_numeric() {
            self.check(
                query.measure_criteria().is_empty()
                    && query.pre_aggregate_measure_criteria().is_empty(),
                format!(
                    "measure criteria require numeric data, got {:?}",
                    query.data_type()
                ),
            )?;
        }

        self.check(
            query.aggregation().is_aggregating() || query.measure_criteria().is_empty(),
            "measure criteria on aggregated values need an aggregation type".to_string(),
        )?;

        if let (Some(start), Some(end)) = (query.start_date(), query.end_date()) {
            self.check(
                start <= end,
                format!("start date {start} is after end date {end}"),
            )?;
        }

        for column in physical_columns(query)? {
            self.check(
                self.settings.has_column(&column),
                format!("dimension {column} is not available in table {}", query.table_name()),
            )?;
        }

        Ok(())
    }

    fn check(&self, condition: bool, message: String) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(AnalyticsError::IllegalQuery(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::models::{
        Aggregation, DataItemRef, DataType, MeasureCriteria, MeasureFilter, OrgUnitMode,
        OrgUnitRef, Period,
    };

    fn valid() -> DimensionalQuery {
        DimensionalQuery::builder("analytics")
            .data_item(DataItemRef::new("fbfJHSPpUQD"))
            .period(Period::parse("2021").unwrap())
            .organisation_unit(OrgUnitRef::root("ImspTQPwCqd"))
            .build()
            .unwrap()
    }

    fn rejected(query: &DimensionalQuery, settings: &TableSettings) -> bool {
        matches!(
            QueryValidator::new(settings).validate(query),
            Err(AnalyticsError::IllegalQuery(_))
        )
    }

    #[test]
    fn accepts_plain_query() {
        assert!(QueryValidator::new(&TableSettings::default())
            .validate(&valid())
            .is_ok());
    }

    #[test]
    fn rejects_structural_problems() {
        let settings = TableSettings::default();

        let no_data = valid().to_builder().data_items(Vec::<DataItemRef>::new()).build().unwrap();
        assert!(rejected(&no_data, &settings));

        let no_units = valid()
            .to_builder()
            .organisation_units(Vec::<OrgUnitRef>::new())
            .org_unit_mode(OrgUnitMode::Children)
            .build()
            .unwrap();
        assert!(rejected(&no_units, &settings));

        let two_periods_last = valid()
            .to_builder()
            .period(Period::parse("2020").unwrap())
            .aggregation(Aggregation::Last)
            .build()
            .unwrap();
        assert!(rejected(&two_periods_last, &settings));

        let text_criteria = valid()
            .to_builder()
            .data_type(DataType::Text)
            .measure_criteria(MeasureCriteria::new().with(MeasureFilter::Gt, 0.0))
            .build()
            .unwrap();
        assert!(rejected(&text_criteria, &settings));
    }

    #[test]
    fn ou_filter_satisfies_explicit_mode() {
        let query = valid()
            .to_builder()
            .organisation_units(Vec::<OrgUnitRef>::new())
            .org_unit_filter(OrgUnitRef::root("ImspTQPwCqd"))
            .build()
            .unwrap();
        assert!(!rejected(&query, &TableSettings::default()));
    }

    #[test]
    fn accepts_org_units_on_several_levels() {
        let root = OrgUnitRef::root("ImspTQPwCqd");
        let query = valid()
            .to_builder()
            .organisation_unit(root.child("O6uvpzGd5pu"))
            .build()
            .unwrap();
        assert!(!rejected(&query, &TableSettings::default()));
    }

    #[test]
    fn rejects_dimension_without_column() {
        let settings = TableSettings {
            skip_column_dimensions: BTreeSet::from(["uidlevel1".to_string()]),
            ..TableSettings::default()
        };
        assert!(rejected(&valid(), &settings));
    }
}
