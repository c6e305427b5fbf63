//! Shared fixtures for the pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use cf_core::{CdmDataType, SchemaCatalog};
use cf_db::{
    ColumnInfo, DbError, DbResult, DuckDbCsvReader, DuckDbWarehouse, LocalObjectStore, Warehouse,
    WriteMode,
};
use cf_etl::{Pipeline, PipelineOptions};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const CATALOG: &str = include_str!("../fixtures/catalog.yml");

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::from_yaml_str(CATALOG).unwrap()
}

/// A project directory with an in-memory warehouse
pub struct Project {
    pub dir: TempDir,
    pub warehouse: Arc<DuckDbWarehouse>,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            warehouse: Arc::new(DuckDbWarehouse::in_memory().unwrap()),
        }
    }

    pub fn cdm_folder(&self) -> PathBuf {
        self.dir.path().join("omop")
    }

    /// Write a file relative to the CDM folder
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.cdm_folder().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.cdm_folder().join(relative)).unwrap();
    }

    pub fn options(&self) -> PipelineOptions {
        let mut options = PipelineOptions::new(self.cdm_folder());
        options.max_parallel_tables = 4;
        options.max_parallel_queries = 2;
        options
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(self.warehouse.clone(), self.options())
    }

    pub fn pipeline_with(
        &self,
        warehouse: Arc<dyn Warehouse>,
        options: PipelineOptions,
    ) -> Pipeline {
        Pipeline::new(
            catalog(),
            warehouse,
            Arc::new(LocalObjectStore::new(self.dir.path().join("bucket"))),
            Arc::new(DuckDbCsvReader::new().unwrap()),
            options,
        )
        .unwrap()
    }

    /// Create the CDM tables and the raw source tables
    pub async fn setup(&self) {
        self.pipeline().create_cdm_tables().await.unwrap();
        self.warehouse
            .execute_batch(
                "CREATE TABLE raw.patients AS SELECT * FROM (VALUES
                    ('p10', 'M', 1980, 'Ghent'),
                    ('p2', 'F', 1975, 'Leuven'),
                    ('p3', 'X', 1990, 'Ghent')
                 ) t(patient_id, sex, birth_year, city);
                 CREATE TABLE raw.visits AS SELECT * FROM (VALUES
                    ('v1', 'p10', DATE '2024-01-05'),
                    ('v2', 'p2', DATE '2024-02-11')
                 ) t(visit_id, patient_id, visit_date);
                 CREATE TABLE raw.diagnoses AS SELECT * FROM (VALUES
                    ('d1', 'p10', 'v1', 'D1', DATE '2024-01-05'),
                    ('d2', 'p2', 'v2', 'D2', DATE '2024-02-11')
                 ) t(diag_id, patient_id, visit_id, code, diag_date);",
            )
            .await
            .unwrap();
    }

    /// Query files for location, person, visit_occurrence and condition_occurrence
    pub fn write_queries(&self) {
        self.write(
            "location/cities.sql",
            "SELECT DISTINCT city AS location_id, city, city AS location_source_value FROM raw.patients",
        );
        self.write(
            "person/patients.sql",
            "SELECT patient_id AS person_id, sex AS gender_concept_id, birth_year AS year_of_birth,
                    city AS location_id, patient_id AS person_source_value, sex AS gender_source_value
             FROM raw.patients;",
        );
        self.write(
            "visit_occurrence/visits.sql.jinja",
            "SELECT visit_id AS visit_occurrence_id, patient_id AS person_id,
                    {{ var('outpatient', 9202) }} AS visit_concept_id, visit_date AS visit_start_date
             FROM {{ raw }}.visits",
        );
        self.write(
            "condition_occurrence/diagnoses.sql",
            "SELECT diag_id AS condition_occurrence_id, patient_id AS person_id, code AS condition_concept_id,
                    diag_date AS condition_start_date, visit_id AS visit_occurrence_id,
                    code AS condition_source_value
             FROM raw.diagnoses",
        );
    }

    pub fn write_gender_mapping(&self, rows: &[(&str, &str, i64)]) {
        let mut csv = String::from("sourceCode,sourceName,mappingStatus,conceptId,conceptName,domainId\n");
        for (code, name, concept) in rows {
            csv.push_str(&format!("{code},{name},APPROVED,{concept},{name},Gender\n"));
        }
        self.write("person/gender_concept_id/gender_usagi.csv", &csv);
    }

    pub async fn count(&self, sql: &str) -> usize {
        self.warehouse.query_count(sql).await.unwrap()
    }

    pub async fn scalar(&self, sql: &str) -> Option<i64> {
        self.warehouse.query_scalar(sql).await.unwrap()
    }
}

/// Warehouse that fails every batch containing `marker`
pub struct FailingWarehouse {
    pub inner: Arc<DuckDbWarehouse>,
    pub marker: String,
}

#[async_trait]
impl Warehouse for FailingWarehouse {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.inner.execute(sql).await
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        if sql.contains(&self.marker) {
            return Err(DbError::ExecutionError(format!(
                "simulated failure for {}",
                self.marker
            )));
        }
        self.inner.execute_batch(sql).await
    }

    async fn execute_atomic(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_atomic(sql).await
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.inner.query_count(sql).await
    }

    async fn query_scalar(&self, sql: &str) -> DbResult<Option<i64>> {
        self.inner.query_scalar(sql).await
    }

    async fn bulk_load(&self, uri: &str, table: &str, mode: WriteMode) -> DbResult<usize> {
        self.inner.bulk_load(uri, table, mode).await
    }

    async fn read_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        self.inner.read_columns(table).await
    }

    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>> {
        self.inner.list_tables(schema).await
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        self.inner.drop_table(table).await
    }

    async fn relation_exists(&self, table: &str) -> DbResult<bool> {
        self.inner.relation_exists(table).await
    }

    fn column_type(&self, data_type: CdmDataType) -> String {
        self.inner.column_type(data_type)
    }

    fn db_type(&self) -> &'static str {
        self.inner.db_type()
    }
}

/// Warehouse whose `execute` statements containing `marker` run on a
/// detached task after `delay`. Dropping the caller's future does not stop
/// the statement, the same as a blocking warehouse call.
pub struct SlowWarehouse {
    pub inner: Arc<DuckDbWarehouse>,
    pub marker: String,
    pub delay: Duration,
    pub finished: Arc<AtomicUsize>,
}

impl SlowWarehouse {
    pub fn new(inner: Arc<DuckDbWarehouse>, marker: &str, delay: Duration) -> Self {
        Self {
            inner,
            marker: marker.to_string(),
            delay,
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait until `count` delayed statements have completed
    pub async fn wait_finished(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while self.finished.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }
}

#[async_trait]
impl Warehouse for SlowWarehouse {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        if !sql.contains(&self.marker) {
            return self.inner.execute(sql).await;
        }
        let inner = Arc::clone(&self.inner);
        let finished = Arc::clone(&self.finished);
        let delay = self.delay;
        let sql = sql.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = inner.execute(&sql).await;
            finished.fetch_add(1, Ordering::SeqCst);
            result
        })
        .await
        .map_err(|e| DbError::ExecutionError(e.to_string()))?
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_batch(sql).await
    }

    async fn execute_atomic(&self, sql: &str) -> DbResult<()> {
        self.inner.execute_atomic(sql).await
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.inner.query_count(sql).await
    }

    async fn query_scalar(&self, sql: &str) -> DbResult<Option<i64>> {
        self.inner.query_scalar(sql).await
    }

    async fn bulk_load(&self, uri: &str, table: &str, mode: WriteMode) -> DbResult<usize> {
        self.inner.bulk_load(uri, table, mode).await
    }

    async fn read_columns(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        self.inner.read_columns(table).await
    }

    async fn list_tables(&self, schema: &str) -> DbResult<Vec<String>> {
        self.inner.list_tables(schema).await
    }

    async fn drop_table(&self, table: &str) -> DbResult<()> {
        self.inner.drop_table(table).await
    }

    async fn relation_exists(&self, table: &str) -> DbResult<bool> {
        self.inner.relation_exists(table).await
    }

    fn column_type(&self, data_type: CdmDataType) -> String {
        self.inner.column_type(data_type)
    }

    fn db_type(&self) -> &'static str {
        self.inner.db_type()
    }
}
