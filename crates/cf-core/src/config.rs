//! Configuration types and parsing for cdmflow.yml

use crate::error::{CoreError, CoreResult};
use crate::identifier::normalize_identifier;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project file names, in lookup order
pub const CONFIG_FILE_NAMES: [&str; 2] = ["cdmflow.yml", "cdmflow.yaml"];

/// Main project configuration from cdmflow.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Folder holding one sub folder per CDM table with its queries,
    /// Usagi exports and custom concept files
    #[serde(default = "default_cdm_folder")]
    pub cdm_folder: String,

    /// Custom schema catalog; the bundled OMOP CDM 5.4 catalog when absent
    #[serde(default)]
    pub catalog: Option<String>,

    /// Warehouse connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Schema names in the warehouse
    #[serde(default)]
    pub schemas: SchemaNames,

    /// Where uploaded files are staged before bulk loading
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Parallelism limits
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Timeout applied to every per-table stage
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,

    /// Output directory for run reports
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// Variables available to query templates through `var()`
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,
}

/// Warehouse connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// DuckDB database file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Names of the three warehouse schemas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaNames {
    /// Source data the queries read from
    #[serde(default = "default_raw_schema")]
    pub raw: String,
    /// Work tables, upload tables and swap tables
    #[serde(default = "default_work_schema")]
    pub work: String,
    /// The target CDM tables
    #[serde(default = "default_omop_schema")]
    pub omop: String,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            raw: default_raw_schema(),
            work: default_work_schema(),
            omop: default_omop_schema(),
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStoreConfig {
    /// Bucket directory for the local object store
    #[serde(default = "default_object_store_root")]
    pub root: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: default_object_store_root(),
        }
    }
}

/// Parallelism limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcurrencyConfig {
    /// Tables processed at the same time within a tier
    #[serde(default = "default_max_parallel_tables")]
    pub max_parallel_tables: usize,
    /// Query files staged at the same time within one table
    #[serde(default = "default_max_parallel_queries")]
    pub max_parallel_queries: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_parallel_tables: default_max_parallel_tables(),
            max_parallel_queries: default_max_parallel_queries(),
        }
    }
}

fn default_cdm_folder() -> String {
    "omop".to_string()
}

fn default_target_path() -> String {
    "target".to_string()
}

const DEFAULT_DB_PATH: &str = "cdmflow.duckdb";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_raw_schema() -> String {
    "raw".to_string()
}

fn default_work_schema() -> String {
    "work".to_string()
}

fn default_omop_schema() -> String {
    "omop".to_string()
}

fn default_object_store_root() -> String {
    ".cdmflow/bucket".to_string()
}

fn default_max_parallel_tables() -> usize {
    9
}

fn default_max_parallel_queries() -> usize {
    16
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .map(|path| Self::load(&path))
            .unwrap_or_else(|| {
                Err(CoreError::ConfigNotFound {
                    path: dir.join(CONFIG_FILE_NAMES[0]).display().to_string(),
                })
            })
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.concurrency.max_parallel_tables == 0 || self.concurrency.max_parallel_queries == 0
        {
            return Err(CoreError::ConfigInvalid {
                message: "Concurrency limits must be at least 1".to_string(),
            });
        }

        if self.stage_timeout_secs == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "stage_timeout_secs must be greater than 0".to_string(),
            });
        }

        let schemas = [
            &self.schemas.raw,
            &self.schemas.work,
            &self.schemas.omop,
        ];
        let mut seen = HashSet::new();
        for schema in schemas {
            let normalized =
                normalize_identifier(schema).ok_or_else(|| CoreError::ConfigInvalid {
                    message: format!("Invalid schema name '{}'", schema),
                })?;
            if !seen.insert(normalized) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("Schema '{}' is used for more than one role", schema),
                });
            }
        }

        Ok(())
    }

    /// Resolve a configured path against the project directory
    pub fn resolve_path(&self, project_dir: &Path, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            project_dir.join(p)
        }
    }

    /// Absolute path of the CDM folder
    pub fn cdm_folder_absolute(&self, project_dir: &Path) -> PathBuf {
        self.resolve_path(project_dir, &self.cdm_folder)
    }

    /// Absolute path of the custom catalog, when configured
    pub fn catalog_absolute(&self, project_dir: &Path) -> Option<PathBuf> {
        self.catalog
            .as_deref()
            .map(|c| self.resolve_path(project_dir, c))
    }

    /// Database path, with `:memory:` passed through unchanged
    pub fn database_path(&self, project_dir: &Path) -> String {
        if self.database.path == ":memory:" {
            self.database.path.clone()
        } else {
            self.resolve_path(project_dir, &self.database.path)
                .display()
                .to_string()
        }
    }

    /// Absolute path of the object store bucket
    pub fn object_store_absolute(&self, project_dir: &Path) -> PathBuf {
        self.resolve_path(project_dir, &self.object_store.root)
    }

    /// Absolute path of the target directory
    pub fn target_path_absolute(&self, project_dir: &Path) -> PathBuf {
        self.resolve_path(project_dir, &self.target_path)
    }

    /// Configured stage timeout
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
