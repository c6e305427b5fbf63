//! Runtime context for CLI commands

use anyhow::{Context, Result};
use cf_core::{Config, SchemaCatalog, TableName};
use cf_db::{DuckDbCsvReader, DuckDbWarehouse, LocalObjectStore};
use cf_etl::{Pipeline, PipelineOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Loaded project configuration and a pipeline bound to its warehouse
pub struct RuntimeContext {
    pub project_dir: PathBuf,
    pub config: Config,
    pub pipeline: Pipeline,
}

impl RuntimeContext {
    /// Load the configuration, the catalog and open the warehouse
    pub fn new(args: &GlobalArgs) -> Result<Self> {
        let project_dir = PathBuf::from(&args.project_dir);

        let config = match &args.config {
            Some(path) => {
                Config::load(Path::new(path)).context("Failed to load configuration file")?
            }
            None => Config::load_from_dir(&project_dir)
                .context("Failed to load project configuration")?,
        };

        let catalog = match config.catalog_absolute(&project_dir) {
            Some(path) => SchemaCatalog::load(&path)
                .with_context(|| format!("Failed to load catalog {}", path.display()))?,
            None => SchemaCatalog::cdm_v54().context("Failed to load the bundled CDM catalog")?,
        };

        let db_path = args
            .database
            .clone()
            .unwrap_or_else(|| config.database_path(&project_dir));
        log::debug!("Opening warehouse {}", db_path);
        let warehouse =
            Arc::new(DuckDbWarehouse::new(&db_path).context("Failed to connect to database")?);
        let reader =
            Arc::new(DuckDbCsvReader::new().context("Failed to start the CSV reader")?);
        let object_store = Arc::new(LocalObjectStore::new(
            config.object_store_absolute(&project_dir),
        ));

        let options = PipelineOptions::from_config(&config, &project_dir);
        let pipeline = Pipeline::new(catalog, warehouse, object_store, reader, options)
            .context("Failed to set up the pipeline")?;

        Ok(Self {
            project_dir,
            config,
            pipeline,
        })
    }

    /// Parse a table name given on the command line
    pub fn table_arg(&self, table: Option<&str>) -> Result<Option<TableName>> {
        table
            .map(|t| {
                t.parse::<TableName>()
                    .with_context(|| format!("Invalid table name '{}'", t))
            })
            .transpose()
    }

    /// Where run reports are written
    pub fn report_path(&self) -> PathBuf {
        self.config
            .target_path_absolute(&self.project_dir)
            .join("run_report.json")
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
