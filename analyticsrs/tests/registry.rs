//! Integration tests for loading the table registry and settings from disk.

use std::collections::BTreeSet;
use std::fs;

use analytics_sql::partition::PartitionManager;
use analytics_sql::{
    AnalyticsConfig, AnalyticsError, OrgUnitHierarchy, OrgUnitProvider, TableRegistry,
};

fn write_tables(root: &std::path::Path) -> anyhow::Result<()> {
    let tables = root.join("tables");
    fs::create_dir_all(&tables)?;
    fs::write(
        tables.join("analytics.yml"),
        "name: analytics\ndescription: aggregated data values\npartitions: [2022, 2021]\n",
    )?;
    fs::write(
        tables.join("analytics_event.yaml"),
        "name: analytics_event\n",
    )?;
    Ok(())
}

#[test]
fn loads_yml_and_yaml_tables() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_tables(dir.path())?;

    let registry = TableRegistry::load_from_dir(dir.path())?;
    assert_eq!(registry.tables.len(), 2);

    let analytics = registry.get_table("analytics").expect("analytics table");
    assert_eq!(analytics.description.as_deref(), Some("aggregated data values"));
    assert_eq!(
        registry.existing_partitions("analytics"),
        Some(BTreeSet::from([2021, 2022]))
    );
    assert_eq!(
        registry.existing_partitions("analytics_event"),
        Some(BTreeSet::new())
    );
    assert_eq!(registry.existing_partitions("unknown"), None);
    Ok(())
}

#[test]
fn missing_tables_directory_is_a_settings_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let err = TableRegistry::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, AnalyticsError::Settings(_)));
    Ok(())
}

#[test]
fn rejects_table_names_that_are_not_identifiers() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let tables = dir.path().join("tables");
    fs::create_dir_all(&tables)?;
    fs::write(tables.join("bad.yml"), "name: \"analytics; drop\"\n")?;

    let err = TableRegistry::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, AnalyticsError::Settings(_)));
    Ok(())
}

#[test]
fn malformed_yaml_surfaces_parse_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let tables = dir.path().join("tables");
    fs::create_dir_all(&tables)?;
    fs::write(tables.join("broken.yml"), "name: [unterminated\n")?;

    let err = TableRegistry::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, AnalyticsError::Yaml(_)));
    Ok(())
}

#[test]
fn settings_file_overrides_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("analytics-sql.toml");
    fs::write(
        &path,
        r#"
[defaults]
skip_index_dimensions = ["ao"]

[tables.analytics_event]
partitioned = false
skip_column_dimensions = ["uidlevel7"]
"#,
    )?;

    let config = AnalyticsConfig::from_file(&path)?;
    let event = config.for_table("analytics_event");
    assert!(!event.partitioned);
    assert!(!event.has_column("uidlevel7"));
    assert!(!event.is_indexed("ao"));
    assert!(config.for_table("analytics").partitioned);

    let missing = AnalyticsConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, AnalyticsError::Settings(_)));
    Ok(())
}

#[test]
fn loads_org_unit_hierarchy() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("org_units.yaml");
    fs::write(
        &path,
        "- uid: ImspTQPwCqd\n  path: /ImspTQPwCqd\n\
         - uid: O6uvpzGd5pu\n  path: /ImspTQPwCqd/O6uvpzGd5pu\n",
    )?;

    let hierarchy = OrgUnitHierarchy::load_from_file(&path)?;
    assert_eq!(hierarchy.len(), 2);
    assert_eq!(hierarchy.org_unit("O6uvpzGd5pu")?.level(), 2);
    assert!(matches!(
        hierarchy.org_unit("unknown"),
        Err(AnalyticsError::IllegalQuery(_))
    ));

    let missing = OrgUnitHierarchy::load_from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(missing, AnalyticsError::Settings(_)));
    Ok(())
}
