//! cf-etl - OMOP CDM ETL engine for cdmflow
//!
//! Loads custom concepts and Usagi code mappings, stages query files into
//! work tables, gives source keys stable surrogate ids and merges the
//! results into the CDM tables, one dependency tier at a time.

pub mod cleanup;
pub mod concepts;
mod context;
mod ddl;
pub mod error;
pub mod folder;
mod keys;
mod loader;
mod merge;
pub mod pipeline;
mod staging;
mod table_run;
pub mod vocabulary;
pub mod work_tables;

pub use cleanup::{CleanupScope, CleanupSummary};
pub use context::PipelineOptions;
pub use error::{EtlError, EtlResult};
pub use folder::CdmFolder;
pub use pipeline::Pipeline;
pub use vocabulary::{VocabularyImport, VOCABULARY_SNAPSHOT_TABLES};
pub use work_tables::CUSTOM_CONCEPT_ID_FLOOR;
