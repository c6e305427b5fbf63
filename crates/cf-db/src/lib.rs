//! cf-db - Warehouse abstraction layer for cdmflow
//!
//! This crate provides the `Warehouse`, `ObjectStore` and `TabularReader`
//! traits with a DuckDB warehouse, a DuckDB-backed CSV to Parquet reader and
//! a local directory object store.

pub mod csv_reader;
pub mod duckdb;
pub mod error;
pub mod object_store;
pub mod traits;

pub use csv_reader::DuckDbCsvReader;
pub use duckdb::DuckDbWarehouse;
pub use error::{DbError, DbResult};
pub use object_store::LocalObjectStore;
pub use traits::{ColumnInfo, CsvFormat, ObjectStore, TabularReader, TypedColumn, Warehouse, WriteMode};
