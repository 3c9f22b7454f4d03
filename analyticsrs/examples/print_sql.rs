use std::{env, fs, path::PathBuf};

use analytics_sql::{
    AnalyticsConfig, AnalyticsEngine, DimensionalQuery, DuckDbDialect, OrgUnitHierarchy,
    PostgresDialect, Principal, QueryRequest, TableRegistry,
};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: print_sql <demo_dir> <principal_json> <request_json> [--duckdb] [--min-max]");
    eprintln!(
        "Example: cargo run --example print_sql -- demos demos/principal.json demos/requests/district_totals.json"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 3 {
        usage();
        std::process::exit(1);
    }

    let duckdb = args.iter().any(|a| a == "--duckdb");
    let min_max = args.iter().any(|a| a == "--min-max");
    args.retain(|a| !a.starts_with("--"));

    let demo_dir = PathBuf::from(args.remove(0));
    let principal_path = PathBuf::from(args.remove(0));
    let request_path = PathBuf::from(args.remove(0));

    let tables = TableRegistry::load_from_dir(&demo_dir)?;
    let config_path = demo_dir.join("analytics-sql.toml");
    let config = if config_path.exists() {
        AnalyticsConfig::from_file(&config_path)?
    } else {
        AnalyticsConfig::load_default()
    };

    let principal: Principal = serde_json::from_str(&fs::read_to_string(principal_path)?)?;
    let request: QueryRequest = serde_json::from_str(&fs::read_to_string(request_path)?)?;
    let org_units = OrgUnitHierarchy::load_from_file(demo_dir.join("org_units.yaml"))?;
    let query = DimensionalQuery::from_request(&request, &org_units)?;

    let engine = if duckdb {
        AnalyticsEngine::new(config, tables, DuckDbDialect)
    } else {
        AnalyticsEngine::new(config, tables, PostgresDialect)
    };

    let sql = if min_max {
        engine.min_max_sql(&query, &principal)?
    } else {
        engine.aggregate_sql(&query, &principal)?
    };
    println!("{sql}");
    Ok(())
}
