//! Collaborator traits used by the pipeline

use crate::error::DbResult;
use async_trait::async_trait;
use cf_core::CdmDataType;
use std::path::Path;

/// How `bulk_load` treats an existing destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the table with the loaded rows
    Truncate,
    /// Add the rows to the table, creating it when missing
    Append,
    /// Load only into a missing or empty table
    Empty,
}

/// A column as the warehouse reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A column to read from a tabular file, with the type to cast it to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedColumn {
    /// Header in the source file (matched case-insensitively)
    pub name: String,
    /// Column name in the output
    pub output: String,
    pub data_type: CdmDataType,
}

impl TypedColumn {
    pub fn new(name: impl Into<String>, data_type: CdmDataType) -> Self {
        let name = name.into();
        Self {
            output: name.to_ascii_lowercase(),
            name,
            data_type,
        }
    }

    /// Write the column under a different name
    pub fn alias(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Delimited text layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: char,
    /// `None` disables quoting entirely
    pub quote: Option<char>,
    /// `strptime` format for date columns; ISO dates when `None`
    pub date_format: Option<String>,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: Some('"'),
            date_format: None,
        }
    }
}

impl CsvFormat {
    /// Layout of Athena vocabulary exports: tab separated, unquoted, `YYYYMMDD` dates
    pub fn athena() -> Self {
        Self {
            delimiter: '\t',
            quote: None,
            date_format: Some("%Y%m%d".to_string()),
        }
    }
}

/// SQL warehouse the pipeline writes to
///
/// Relation names are passed as `schema.table`. Implementations must be
/// Send + Sync so tables can be processed from concurrent tasks.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute one statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute multiple statements in one transaction, rolled back on error
    async fn execute_atomic(&self, sql: &str) -> DbResult<()>;

    /// Number of rows a query returns
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// First column of the first row as an integer
    async fn query_scalar(&self, sql: &str) -> DbResult<Option<i64>>;

    /// Load a Parquet file from the object store into a table, returns rows loaded
    async fn bulk_load(&self, uri: &str, table: &str, mode: WriteMode) -> DbResult<usize>;

    /// Columns of a relation in ordinal order; empty when it does not exist
    async fn read_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Tables in a schema, sorted by name
    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>>;

    /// Drop a table if it exists
    async fn drop_table(&self, table: &str) -> DbResult<()>;

    /// Check if a table or view exists
    async fn relation_exists(&self, table: &str) -> DbResult<bool>;

    /// DDL type for a catalog column type
    fn column_type(&self, data_type: CdmDataType) -> String;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}

/// Stores files where the warehouse can bulk load them from
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `destination`, returns the URI to load from
    async fn upload(&self, local: &Path, destination: &str) -> DbResult<String>;
}

/// Reads delimited files into typed Parquet
#[async_trait]
pub trait TabularReader: Send + Sync {
    /// Read `columns` from `path`, cast them and write `destination`.
    /// Returns the number of rows written.
    async fn read_typed(
        &self,
        path: &Path,
        columns: &[TypedColumn],
        format: &CsvFormat,
        destination: &Path,
    ) -> DbResult<usize>;
}
