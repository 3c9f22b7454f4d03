use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::models::is_valid_identifier;
use crate::partition::{PartitionId, PartitionManager};

/// An analytics fact table and the yearly partitions that physically exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsTable {
    pub name: String,
    #[serde(default)]
    pub partitions: BTreeSet<PartitionId>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct TableRegistry {
    pub tables: HashMap<String, AnalyticsTable>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: Vec<AnalyticsTable>) -> Self {
        let mut registry = TableRegistry::new();
        for table in tables {
            registry.tables.insert(table.name.clone(), table);
        }
        registry
    }

    /// Load every `tables/*.yml` and `tables/*.yaml` file under `root`.
    pub fn load_from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let mut registry = TableRegistry::new();
        registry.load_tables(root.as_ref().join("tables"))?;
        tracing::debug!(tables = registry.tables.len(), "loaded analytics tables");
        Ok(registry)
    }

    fn load_tables(&mut self, dir: PathBuf) -> Result<()> {
        if !dir.exists() {
            return Err(AnalyticsError::Settings(format!(
                "tables directory not found: {}",
                dir.display()
            )));
        }
        for pattern in ["yml", "yaml"] {
            for entry in glob(&format!("{}/*.{pattern}", dir.display()))
                .map_err(|e| AnalyticsError::Other(e.into()))?
                .flatten()
            {
                self.load_table_file(&entry)?;
            }
        }
        Ok(())
    }

    fn load_table_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let table: AnalyticsTable = serde_yaml::from_str(&contents)?;
        if !is_valid_identifier(&table.name) {
            return Err(AnalyticsError::Settings(format!(
                "table name `{}` in {} is not a valid identifier",
                table.name,
                path.display()
            )));
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Option<&AnalyticsTable> {
        self.tables.get(name)
    }
}

impl PartitionManager for TableRegistry {
    fn existing_partitions(&self, table: &str) -> Option<BTreeSet<PartitionId>> {
        self.get_table(table).map(|t| t.partitions.clone())
    }
}
