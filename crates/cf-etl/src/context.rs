//! Shared state of a pipeline

use crate::concepts::ConceptIdAllocator;
use crate::error::{EtlError, EtlResult};
use crate::folder::CdmFolder;
use crate::work_tables::WorkTables;
use cf_core::{Config, SchemaCatalog, SchemaNames};
use cf_db::{ObjectStore, TabularReader, Warehouse};
use cf_jinja::QueryRenderer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Settings of one pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub cdm_folder: PathBuf,
    pub schemas: SchemaNames,
    pub max_parallel_tables: usize,
    pub max_parallel_queries: usize,
    pub stage_timeout: Option<Duration>,
    pub vars: HashMap<String, serde_yaml::Value>,
}

impl PipelineOptions {
    /// Options with defaults for everything but the CDM folder
    pub fn new(cdm_folder: impl Into<PathBuf>) -> Self {
        Self {
            cdm_folder: cdm_folder.into(),
            schemas: SchemaNames::default(),
            max_parallel_tables: 9,
            max_parallel_queries: 16,
            stage_timeout: None,
            vars: HashMap::new(),
        }
    }

    /// Options from a project configuration
    pub fn from_config(config: &Config, project_dir: &Path) -> Self {
        Self {
            cdm_folder: config.cdm_folder_absolute(project_dir),
            schemas: config.schemas.clone(),
            max_parallel_tables: config.concurrency.max_parallel_tables,
            max_parallel_queries: config.concurrency.max_parallel_queries,
            stage_timeout: config.stage_timeout(),
            vars: config.vars.clone(),
        }
    }
}

/// Everything table runs share
pub(crate) struct EtlContext {
    pub catalog: SchemaCatalog,
    pub warehouse: Arc<dyn Warehouse>,
    pub object_store: Arc<dyn ObjectStore>,
    pub reader: Arc<dyn TabularReader>,
    pub renderer: QueryRenderer,
    pub folder: CdmFolder,
    pub tables: WorkTables,
    pub options: PipelineOptions,
    /// Local directory for converted files before upload
    pub staging: tempfile::TempDir,
    pub concept_ids: ConceptIdAllocator,
    /// Serializes writes to `concept` and `source_to_concept_map`
    pub catalog_writes: Mutex<()>,
}

impl EtlContext {
    pub fn new(
        catalog: SchemaCatalog,
        warehouse: Arc<dyn Warehouse>,
        object_store: Arc<dyn ObjectStore>,
        reader: Arc<dyn TabularReader>,
        options: PipelineOptions,
    ) -> EtlResult<Self> {
        let renderer = QueryRenderer::new(warehouse.db_type(), &options.vars)?;
        let staging = tempfile::Builder::new()
            .prefix("cdmflow-")
            .tempdir()
            .map_err(|e| EtlError::Io {
                path: std::env::temp_dir().display().to_string(),
                source: e,
            })?;

        Ok(Self {
            catalog,
            warehouse,
            object_store,
            reader,
            renderer,
            folder: CdmFolder::new(options.cdm_folder.clone()),
            tables: WorkTables::new(&options.schemas),
            options,
            staging,
            concept_ids: ConceptIdAllocator::default(),
            catalog_writes: Mutex::new(()),
        })
    }
}
