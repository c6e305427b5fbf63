//! Delimited file reader backed by an embedded DuckDB instance

use crate::error::{DbError, DbResult};
use cf_core::sql_utils::{quote_ident, quote_literal};
use crate::traits::{CsvFormat, TabularReader, TypedColumn};
use async_trait::async_trait;
use cf_core::CdmDataType;
use duckdb::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Reads CSV files with every value as text, casts each column to its
/// declared type and writes the result as Parquet.
///
/// The reader has its own in-memory database so file conversion never
/// competes with warehouse transactions.
pub struct DuckDbCsvReader {
    conn: Mutex<Connection>,
}

impl DuckDbCsvReader {
    pub fn new() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> DbResult<Connection> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        conn.try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }
}

fn cast_expression(column: &TypedColumn, format: &CsvFormat) -> String {
    let source = quote_ident(&column.name);
    let value = format!("NULLIF(TRIM({}), '')", source);
    let expr = match column.data_type {
        CdmDataType::Varchar(_) => source,
        CdmDataType::Integer => format!("CAST({} AS BIGINT)", value),
        CdmDataType::Float => format!("CAST({} AS DOUBLE)", value),
        CdmDataType::Date => match &format.date_format {
            Some(fmt) => format!("CAST(strptime({}, {}) AS DATE)", value, quote_literal(fmt)),
            None => format!("CAST({} AS DATE)", value),
        },
        CdmDataType::DateTime => format!("CAST({} AS TIMESTAMP)", value),
    };
    format!("{} AS {}", expr, quote_ident(&column.output))
}

/// The COPY statement converting `path` into `destination`
pub(crate) fn conversion_sql(
    path: &Path,
    columns: &[TypedColumn],
    format: &CsvFormat,
    destination: &Path,
) -> String {
    let select = columns
        .iter()
        .map(|c| cast_expression(c, format))
        .collect::<Vec<_>>()
        .join(", ");
    let quote = format.quote.map(|q| q.to_string()).unwrap_or_default();
    format!(
        "COPY (SELECT {} FROM read_csv({}, header = true, all_varchar = true, delim = {}, quote = {}, escape = {})) TO {} (FORMAT PARQUET)",
        select,
        quote_literal(&path.display().to_string()),
        quote_literal(&format.delimiter.to_string()),
        quote_literal(&quote),
        quote_literal(&quote),
        quote_literal(&destination.display().to_string()),
    )
}

#[async_trait]
impl TabularReader for DuckDbCsvReader {
    async fn read_typed(
        &self,
        path: &Path,
        columns: &[TypedColumn],
        format: &CsvFormat,
        destination: &Path,
    ) -> DbResult<usize> {
        let sql = conversion_sql(path, columns, format, destination);
        let display = path.display().to_string();
        let written = destination.display().to_string();
        let conn = self.connection()?;
        log::debug!("Converting {}: {}", display, sql);

        tokio::task::spawn_blocking(move || {
            let load_error = |e: duckdb::Error| DbError::LoadError {
                path: display.clone(),
                message: e.to_string(),
            };
            conn.execute_batch(&sql).map_err(load_error)?;
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM read_parquet({})", quote_literal(&written)),
                    [],
                    |row| row.get(0),
                )
                .map_err(load_error)?;
            Ok(count as usize)
        })
        .await
        .map_err(|e| DbError::Internal(format!("blocking task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn usagi_columns() -> Vec<TypedColumn> {
        vec![
            TypedColumn::new("sourceCode", CdmDataType::Varchar(None)).alias("source_code"),
            TypedColumn::new("conceptId", CdmDataType::Integer).alias("concept_id"),
        ]
    }

    #[tokio::test]
    async fn test_read_typed_csv() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("gender_usagi.csv");
        fs::write(&csv, "sourceCode,sourceName,conceptId\nM,Male,8507\nF,Female,8532\nX,Unknown,\n")
            .unwrap();
        let out = dir.path().join("gender.parquet");

        let reader = DuckDbCsvReader::new().unwrap();
        let rows = reader
            .read_typed(&csv, &usagi_columns(), &CsvFormat::default(), &out)
            .await
            .unwrap();
        assert_eq!(rows, 3);

        let conn = Connection::open_in_memory().unwrap();
        let nulls: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM read_parquet({}) WHERE concept_id IS NULL",
                    quote_literal(&out.display().to_string())
                ),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[tokio::test]
    async fn test_cast_failure_names_file() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("bad_usagi.csv");
        fs::write(&csv, "sourceCode,conceptId\nM,not-a-number\n").unwrap();

        let reader = DuckDbCsvReader::new().unwrap();
        let err = reader
            .read_typed(
                &csv,
                &usagi_columns(),
                &CsvFormat::default(),
                &dir.path().join("bad.parquet"),
            )
            .await
            .unwrap_err();
        match err {
            DbError::LoadError { path, .. } => assert!(path.ends_with("bad_usagi.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_athena_dates() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("VOCABULARY.csv");
        fs::write(
            &csv,
            "vocabulary_id\tvalid_start_date\nGender\t19700101\nRace \"old\"\t20240131\n",
        )
        .unwrap();
        let columns = vec![
            TypedColumn::new("vocabulary_id", CdmDataType::Varchar(Some(20))),
            TypedColumn::new("valid_start_date", CdmDataType::Date),
        ];

        let reader = DuckDbCsvReader::new().unwrap();
        let rows = reader
            .read_typed(&csv, &columns, &CsvFormat::athena(), &dir.path().join("v.parquet"))
            .await
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_conversion_sql_disables_quoting() {
        let sql = conversion_sql(
            Path::new("/tmp/CONCEPT.csv"),
            &[TypedColumn::new("concept_id", CdmDataType::Integer)],
            &CsvFormat::athena(),
            Path::new("/tmp/concept.parquet"),
        );
        assert!(sql.contains("quote = ''"));
        assert!(sql.contains("CAST(NULLIF(TRIM(\"concept_id\"), '') AS BIGINT) AS \"concept_id\""));
    }
}
