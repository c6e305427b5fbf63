//! Error types for cf-etl

use cf_core::{CoreError, ErrorKind, Stage};
use cf_db::DbError;
use cf_jinja::JinjaError;
use std::time::Duration;
use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum EtlError {
    /// Catalog, config or naming error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Warehouse, reader or object store error
    #[error(transparent)]
    Db(#[from] DbError),

    /// Template error
    #[error(transparent)]
    Jinja(#[from] JinjaError),

    /// Usagi or custom concept file that cannot be read (P001)
    #[error("[P001] Malformed mapping file {path}: {message}")]
    MappingFileMalformed { path: String, message: String },

    /// Stage exceeded its time limit (P002)
    #[error("[P002] Stage {stage} of table '{table}' timed out after {limit:?}")]
    StageTimeout {
        table: String,
        stage: Stage,
        limit: Duration,
    },

    /// IO error with path context (P004)
    #[error("[P004] IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Vocabulary archive cannot be extracted (P005)
    #[error("[P005] Invalid vocabulary archive {path}: {message}")]
    Archive { path: String, message: String },

    /// File pattern error while scanning the CDM folder (P006)
    #[error("[P006] Cannot scan '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// A table task panicked or was aborted (P007)
    #[error("[P007] Table task failed: {0}")]
    Task(String),
}

/// Result type alias for EtlError
pub type EtlResult<T> = Result<T, EtlError>;

impl EtlError {
    /// Classify the error for the run report
    pub fn kind(&self) -> ErrorKind {
        match self {
            EtlError::Core(CoreError::CyclicDependency { .. }) => ErrorKind::CyclicDependency,
            EtlError::Core(CoreError::Io(_) | CoreError::IoWithPath { .. }) => ErrorKind::Io,
            EtlError::Core(_) => ErrorKind::SchemaInconsistency,
            EtlError::Db(_) | EtlError::Task(_) => ErrorKind::ExecutorError,
            EtlError::Jinja(_) => ErrorKind::TemplateError,
            EtlError::MappingFileMalformed { .. } => ErrorKind::MappingFileMalformed,
            EtlError::StageTimeout { .. } => ErrorKind::StageTimeout,
            EtlError::Io { .. } | EtlError::Archive { .. } | EtlError::Pattern { .. } => {
                ErrorKind::Io
            }
        }
    }

    /// File the error is about, when there is one
    pub fn path(&self) -> Option<String> {
        match self {
            EtlError::MappingFileMalformed { path, .. }
            | EtlError::Io { path, .. }
            | EtlError::Archive { path, .. } => Some(path.clone()),
            EtlError::Db(DbError::LoadError { path, .. }) => Some(path.clone()),
            EtlError::Core(CoreError::IoWithPath { path, .. }) => Some(path.clone()),
            _ => None,
        }
    }

    /// Reclassify a file load failure as a malformed mapping file
    pub(crate) fn mapping_file(self) -> Self {
        match self {
            EtlError::Db(DbError::LoadError { path, message }) => {
                EtlError::MappingFileMalformed { path, message }
            }
            other => other,
        }
    }

    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        EtlError::Core(CoreError::SchemaInconsistency {
            table: table.to_string(),
            reason: reason.into(),
        })
    }
}
