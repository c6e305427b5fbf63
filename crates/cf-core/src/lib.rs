//! cf-core - Core library for cdmflow
//!
//! This crate provides the schema catalog, strongly-typed identifiers, the
//! dependency resolver, polymorphic reference inference, pipeline stages,
//! run reports and project configuration shared by the other cdmflow crates.

pub mod catalog;
pub mod config;
pub mod error;
mod identifier;
pub mod names;
pub mod query_file;
pub mod report;
pub mod resolver;
pub mod sql_utils;
pub mod stage;

pub use catalog::{
    CatalogOverride, CatalogSchema, CdmDataType, ColumnSpec, SchemaCatalog, TableSpec,
    CDM_V54_CATALOG, VOCABULARY_TABLE,
};
pub use config::{Config, SchemaNames};
pub use error::{CoreError, CoreResult};
pub use names::{ColumnName, TableName};
pub use query_file::{infer_event_references, EventReference, QueryFile};
pub use report::{
    DanglingReference, ErrorKind, RunReport, SkipReason, TableError, TableOutcome, TableState,
};
pub use resolver::{render_tiers, resolve, DependencyGraph, ExecutionTier};
pub use stage::Stage;
