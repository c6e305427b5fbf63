//! DuckDB warehouse implementation

use crate::error::{DbError, DbResult};
use cf_core::sql_utils::{quote_literal, quote_qualified, split_qualified};
use crate::traits::{ColumnInfo, Warehouse, WriteMode};
use async_trait::async_trait;
use cf_core::CdmDataType;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// DuckDB warehouse
///
/// Every call runs on its own clone of the root connection inside
/// `spawn_blocking`, so statements from concurrent tables execute in parallel
/// and an abandoned future does not block the runtime.
pub struct DuckDbWarehouse {
    conn: Mutex<Connection>,
}

impl DuckDbWarehouse {
    /// Create a new in-memory DuckDB database
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a DuckDB database file
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn connection(&self) -> DbResult<Connection> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        conn.try_clone()
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    async fn with_connection<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DbResult<T> + Send + 'static,
    {
        let mut conn = self.connection()?;
        tokio::task::spawn_blocking(move || f(&mut conn))
            .await
            .map_err(|e| DbError::Internal(format!("blocking task failed: {}", e)))?
    }
}

fn execution_error(err: duckdb::Error, sql: &str) -> DbError {
    match DbError::from(err) {
        DbError::ExecutionError(msg) => DbError::ExecutionError(format!("{}: {}", msg, sql)),
        other => other,
    }
}

fn count_rows(conn: &Connection, sql: &str) -> DbResult<usize> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
            row.get(0)
        })
        .map_err(|e| execution_error(e, sql))?;
    Ok(count as usize)
}

fn relation_exists_sync(conn: &Connection, name: &str) -> DbResult<bool> {
    let (schema, table) = split_qualified(name);
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
        params![schema, table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn load_error(uri: &str, err: impl std::fmt::Display) -> DbError {
    DbError::LoadError {
        path: uri.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl Warehouse for DuckDbWarehouse {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            conn.execute(&sql, []).map_err(|e| execution_error(e, &sql))
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.with_connection(move |conn| conn.execute_batch(&sql).map_err(DbError::from))
            .await
    }

    async fn execute_atomic(&self, sql: &str) -> DbResult<()> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            // Dropping the transaction without commit rolls it back.
            let tx = conn.transaction()?;
            tx.execute_batch(&sql)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        let sql = sql.to_string();
        self.with_connection(move |conn| count_rows(conn, &sql))
            .await
    }

    async fn query_scalar(&self, sql: &str) -> DbResult<Option<i64>> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            conn.query_row(&sql, [], |row| row.get::<_, Option<i64>>(0))
                .map_err(|e| execution_error(e, &sql))
        })
        .await
    }

    async fn bulk_load(&self, uri: &str, table: &str, mode: WriteMode) -> DbResult<usize> {
        let uri = uri.to_string();
        let table = table.to_string();
        self.with_connection(move |conn| {
            let source = format!("SELECT * FROM read_parquet({})", quote_literal(&uri));
            let target = quote_qualified(&table);
            let exists = relation_exists_sync(conn, &table)?;
            let sql = match mode {
                WriteMode::Truncate => format!("CREATE OR REPLACE TABLE {} AS {}", target, source),
                WriteMode::Append if exists => {
                    format!("INSERT INTO {} BY NAME {}", target, source)
                }
                WriteMode::Append => format!("CREATE TABLE {} AS {}", target, source),
                WriteMode::Empty => {
                    if exists && count_rows(conn, &format!("SELECT * FROM {}", target))? > 0 {
                        return Err(load_error(
                            &uri,
                            format!("destination table {} is not empty", table),
                        ));
                    }
                    format!("CREATE OR REPLACE TABLE {} AS {}", target, source)
                }
            };
            conn.execute_batch(&sql).map_err(|e| load_error(&uri, e))?;
            count_rows(conn, &source).map_err(|e| load_error(&uri, e))
        })
        .await
    }

    async fn read_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let (schema, name) = split_qualified(&table);
            let mut stmt = conn.prepare(
                "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
            )?;
            let rows = stmt.query_map(params![schema, name], |row| {
                let nullable: String = row.get(2)?;
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    nullable: nullable == "YES",
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
        .await
    }

    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>> {
        let schema = schema.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = ? AND table_type = 'BASE TABLE' ORDER BY table_name",
            )?;
            let rows = stmt.query_map(params![schema], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
        })
        .await
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_qualified(table)))
            .await
    }

    async fn relation_exists(&self, table: &str) -> DbResult<bool> {
        let table = table.to_string();
        self.with_connection(move |conn| relation_exists_sync(conn, &table))
            .await
    }

    fn column_type(&self, data_type: CdmDataType) -> String {
        match data_type {
            CdmDataType::Integer => "BIGINT".to_string(),
            CdmDataType::Float => "DOUBLE".to_string(),
            CdmDataType::Date => "DATE".to_string(),
            CdmDataType::DateTime => "TIMESTAMP".to_string(),
            CdmDataType::Varchar(_) => "VARCHAR".to_string(),
        }
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}
