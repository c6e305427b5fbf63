//! Error types for cf-core

use thiserror::Error;

/// Core error type for cdmflow
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C004: Schema catalog could not be parsed
    #[error("[C004] Failed to parse schema catalog: {message}")]
    CatalogParseError { message: String },

    /// C005: Schema catalog is internally inconsistent
    #[error("[C005] Invalid schema catalog: {message}")]
    CatalogInvalid { message: String },

    /// C006: Table is not part of the schema catalog
    #[error("[C006] Unknown table '{name}'")]
    UnknownTable { name: String },

    /// C007: Foreign keys form a cycle
    #[error(
        "[C007] Cyclic dependency between tables [{}]; unresolved tables: [{}]",
        .cycle.join(", "),
        .unresolved.join(", ")
    )]
    CyclicDependency {
        cycle: Vec<String>,
        unresolved: Vec<String>,
    },

    /// C008: Table metadata contradicts itself or the warehouse
    #[error("[C008] Schema inconsistency in table '{table}': {reason}")]
    SchemaInconsistency { table: String, reason: String },

    /// C009: Query file name does not follow the naming convention
    #[error("[C009] Invalid query file name '{file}': {reason}")]
    InvalidQueryFileName { file: String, reason: String },

    /// C010: Empty identifier
    #[error("[C010] Empty name in {context}")]
    EmptyName { context: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error with file path context
    #[error("IO error at {path}: {source}")]
    IoWithPath {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
