//! Integration tests for organisation-unit and dimension constraint injection.

use std::collections::BTreeSet;

use analytics_sql::error::ErrorCategory;
use analytics_sql::security::{decide_access, with_user_constraints};
use analytics_sql::{
    AnalyticsError, DataItemRef, DimensionalQuery, OrgUnitMode, OrgUnitRef, Period, Principal,
};

fn sierra_leone() -> OrgUnitRef {
    OrgUnitRef::root("ImspTQPwCqd")
}

fn bo() -> OrgUnitRef {
    sierra_leone().child("O6uvpzGd5pu")
}

fn bombali() -> OrgUnitRef {
    sierra_leone().child("fdc6uOvgoji")
}

fn base_query() -> DimensionalQuery {
    DimensionalQuery::builder("analytics")
        .data_item(DataItemRef::new("fbfJHSPpUQD"))
        .period(Period::parse("2021").unwrap())
        .build()
        .unwrap()
}

fn officer() -> Principal {
    Principal::new("district_officer").with_data_view_org_unit(bo())
}

#[test]
fn injects_data_view_unit_when_query_has_no_org_unit_constraint() {
    let query = base_query();
    let constrained = with_user_constraints(&query, &officer()).unwrap();

    assert_eq!(constrained.organisation_units(), &BTreeSet::from([bo()]));
    assert!(constrained.enrollment_org_units().is_empty());
    // the input is never modified
    assert!(query.organisation_units().is_empty());
}

#[test]
fn injects_every_data_view_unit() {
    let principal = officer().with_data_view_org_unit(bombali());
    let constrained = with_user_constraints(&base_query(), &principal).unwrap();
    assert_eq!(
        constrained.organisation_units(),
        &BTreeSet::from([bo(), bombali()])
    );
}

#[test]
fn explicit_org_unit_dimension_is_preserved() {
    let query = base_query()
        .to_builder()
        .organisation_unit(bombali())
        .build()
        .unwrap();
    let constrained = with_user_constraints(&query, &officer()).unwrap();
    assert_eq!(constrained.organisation_units(), &BTreeSet::from([bombali()]));
}

#[test]
fn org_unit_and_enrollment_filter_are_both_kept() {
    let ou_a = bo().child("YuQRtpLP10I");
    let ou_b = bo().child("vWbkYPRmKyS");
    let query = base_query()
        .to_builder()
        .organisation_unit(ou_a.clone())
        .enrollment_org_units([ou_b.clone()])
        .build()
        .unwrap();

    let constrained = with_user_constraints(&query, &officer()).unwrap();
    assert_eq!(constrained.organisation_units(), &BTreeSet::from([ou_a]));
    assert_eq!(constrained.enrollment_org_units(), &BTreeSet::from([ou_b]));
}

#[test]
fn enrollment_filter_alone_suppresses_default_injection() {
    let query = base_query()
        .to_builder()
        .enrollment_org_units([bo()])
        .build()
        .unwrap();
    let constrained = with_user_constraints(&query, &officer()).unwrap();
    assert!(constrained.organisation_units().is_empty());
    assert_eq!(constrained.enrollment_org_units(), &BTreeSet::from([bo()]));
}

#[test]
fn org_unit_filter_suppresses_default_injection() {
    let query = base_query()
        .to_builder()
        .org_unit_filter(bo().child("YuQRtpLP10I"))
        .build()
        .unwrap();
    assert!(decide_access(&query, &officer()).is_ok());
    let constrained = with_user_constraints(&query, &officer()).unwrap();
    assert!(constrained.organisation_units().is_empty());
    assert_eq!(
        constrained.org_unit_filters(),
        &BTreeSet::from([bo().child("YuQRtpLP10I")])
    );
}

#[test]
fn org_unit_filter_outside_granted_subtree_is_denied() {
    let query = base_query()
        .to_builder()
        .org_unit_filter(bombali())
        .build()
        .unwrap();
    let err = decide_access(&query, &officer()).unwrap_err();
    assert!(matches!(err, AnalyticsError::AccessDenied(_)));
    assert_eq!(err.category(), ErrorCategory::Forbidden);
}

#[test]
fn org_unit_filter_above_granted_unit_is_denied() {
    let query = base_query()
        .to_builder()
        .org_unit_filter(sierra_leone())
        .build()
        .unwrap();
    assert!(matches!(
        decide_access(&query, &officer()),
        Err(AnalyticsError::AccessDenied(_))
    ));
}

#[test]
fn reserved_ids_are_rejected_as_filter_keys() {
    for id in ["ou", "enrollmentou", "dx", "pe"] {
        let err = base_query()
            .to_builder()
            .filter(id, ["fdc6uOvgoji"])
            .build()
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::IllegalQuery(_)), "{id}");
    }
}

#[test]
fn data_view_units_on_several_levels_are_injected() {
    let chiefdom = bombali().child("jUb8gELQApl");
    let principal = officer().with_data_view_org_unit(chiefdom.clone());
    let constrained = with_user_constraints(&base_query(), &principal).unwrap();
    assert_eq!(
        constrained.organisation_units(),
        &BTreeSet::from([bo(), chiefdom])
    );
}

#[test]
fn super_user_query_is_returned_unchanged() {
    let query = base_query()
        .to_builder()
        .org_unit_mode(OrgUnitMode::All)
        .build()
        .unwrap();
    let constrained = with_user_constraints(&query, &Principal::super_user("admin")).unwrap();
    assert_eq!(constrained, query);
}

#[test]
fn principal_without_any_unit_is_denied() {
    let err = with_user_constraints(&base_query(), &Principal::new("nobody")).unwrap_err();
    assert!(matches!(err, AnalyticsError::AccessDenied(_)));
    assert_eq!(err.category(), ErrorCategory::Forbidden);
}

#[test]
fn data_capture_units_back_up_missing_data_view_units() {
    let principal = Principal::new("clerk").with_data_capture_org_unit(bombali());
    let constrained = with_user_constraints(&base_query(), &principal).unwrap();
    assert_eq!(constrained.organisation_units(), &BTreeSet::from([bombali()]));
}

#[test]
fn dimension_constraints_intersect_requested_filter() {
    let query = base_query()
        .to_builder()
        .filter("co", ["Prlt0C1RF0s", "V6L425pT3A0"])
        .build()
        .unwrap();
    let principal = officer().with_dimension_constraint("co", ["Prlt0C1RF0s", "psbwp3CQEhs"]);

    let constrained = with_user_constraints(&query, &principal).unwrap();
    assert_eq!(
        constrained.filters().get("co"),
        Some(&BTreeSet::from(["Prlt0C1RF0s".to_string()]))
    );
}

#[test]
fn dimension_constraint_becomes_filter_when_absent() {
    let principal = officer().with_dimension_constraint("ao", ["HllvX50cXC0"]);
    let constrained = with_user_constraints(&base_query(), &principal).unwrap();
    assert_eq!(
        constrained.filters().get("ao"),
        Some(&BTreeSet::from(["HllvX50cXC0".to_string()]))
    );
}

#[test]
fn empty_dimension_intersection_is_access_denied() {
    let query = base_query()
        .to_builder()
        .filter("co", ["V6L425pT3A0"])
        .build()
        .unwrap();
    let principal = officer().with_dimension_constraint("co", ["Prlt0C1RF0s"]);

    let err = with_user_constraints(&query, &principal).unwrap_err();
    assert!(matches!(err, AnalyticsError::AccessDenied(_)));
}

#[test]
fn units_outside_granted_subtree_are_denied() {
    let query = base_query()
        .to_builder()
        .organisation_unit(bombali())
        .build()
        .unwrap();
    let err = decide_access(&query, &officer()).unwrap_err();
    assert!(matches!(err, AnalyticsError::AccessDenied(_)));

    let inside = base_query()
        .to_builder()
        .organisation_unit(bo().child("YuQRtpLP10I"))
        .enrollment_org_units([bo()])
        .build()
        .unwrap();
    assert!(decide_access(&inside, &officer()).is_ok());
}

#[test]
fn enrollment_units_outside_granted_subtree_are_denied() {
    let query = base_query()
        .to_builder()
        .enrollment_org_units([bombali()])
        .build()
        .unwrap();
    assert!(matches!(
        decide_access(&query, &officer()),
        Err(AnalyticsError::AccessDenied(_))
    ));
}
