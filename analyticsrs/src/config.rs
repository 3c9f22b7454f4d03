//! Configuration for analytics SQL generation.
//!
//! Supports TOML-based configuration with global defaults and per-table overrides.
//! The resolved [`TableSettings`] is a read-only snapshot passed explicitly into
//! the partition resolver, validator and subquery strategies.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Defaults applied to every analytics table unless overridden.
    pub defaults: TableDefaults,

    /// Per-table overrides keyed by logical table name.
    pub tables: HashMap<String, TableOverrides>,
}

/// Global table settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TableDefaults {
    /// Tables are split into yearly partitions (default: true).
    pub partitioned: bool,
    /// Always read the base table, ignoring partitions (default: false).
    pub skip_partitioning: bool,
    /// Dimensions created without an index.
    pub skip_index_dimensions: BTreeSet<String>,
    /// Dimensions whose columns are not materialised in the table.
    pub skip_column_dimensions: BTreeSet<String>,
}

/// Per-table overrides (every field optional).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TableOverrides {
    pub partitioned: Option<bool>,
    pub skip_partitioning: Option<bool>,
    pub skip_index_dimensions: Option<BTreeSet<String>>,
    pub skip_column_dimensions: Option<BTreeSet<String>>,
}

impl Default for TableDefaults {
    fn default() -> Self {
        Self {
            partitioned: true,
            skip_partitioning: false,
            skip_index_dimensions: BTreeSet::new(),
            skip_column_dimensions: BTreeSet::new(),
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AnalyticsError::Settings(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| AnalyticsError::Settings(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `ANALYTICS_SQL_CONFIG` environment variable
    /// 2. `./analytics-sql.toml` (current directory)
    /// 3. `~/.config/analytics-sql/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("ANALYTICS_SQL_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from ANALYTICS_SQL_CONFIG");
                    return cfg;
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "ignoring unreadable config"),
            }
        }

        if let Ok(cfg) = Self::from_file("analytics-sql.toml") {
            tracing::info!("loaded config from ./analytics-sql.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("analytics-sql").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Resolved settings for one table (overrides merged onto defaults).
    pub fn for_table(&self, name: &str) -> TableSettings {
        TableSettings::merge(&self.defaults, self.tables.get(name))
    }
}

/// Fully resolved settings for one table (no Option fields).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSettings {
    pub partitioned: bool,
    pub skip_partitioning: bool,
    pub skip_index_dimensions: BTreeSet<String>,
    pub skip_column_dimensions: BTreeSet<String>,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self::merge(&TableDefaults::default(), None)
    }
}

impl TableSettings {
    fn merge(defaults: &TableDefaults, overrides: Option<&TableOverrides>) -> Self {
        match overrides {
            Some(t) => Self {
                partitioned: t.partitioned.unwrap_or(defaults.partitioned),
                skip_partitioning: t.skip_partitioning.unwrap_or(defaults.skip_partitioning),
                skip_index_dimensions: t
                    .skip_index_dimensions
                    .clone()
                    .unwrap_or_else(|| defaults.skip_index_dimensions.clone()),
                skip_column_dimensions: t
                    .skip_column_dimensions
                    .clone()
                    .unwrap_or_else(|| defaults.skip_column_dimensions.clone()),
            },
            None => Self {
                partitioned: defaults.partitioned,
                skip_partitioning: defaults.skip_partitioning,
                skip_index_dimensions: defaults.skip_index_dimensions.clone(),
                skip_column_dimensions: defaults.skip_column_dimensions.clone(),
            },
        }
    }

    pub fn has_column(&self, dimension: &str) -> bool {
        !self.skip_column_dimensions.contains(dimension)
    }

    pub fn is_indexed(&self, dimension: &str) -> bool {
        !self.skip_index_dimensions.contains(dimension)
    }
}
