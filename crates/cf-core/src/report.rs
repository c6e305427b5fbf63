//! Run report: terminal state and collected errors for every table
//!
//! A report is built while the pipeline runs and saved as JSON once the run
//! ends, so a failed run can be inspected after the process exits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::names::{ColumnName, TableName};
use crate::resolver::ExecutionTier;
use crate::stage::Stage;

/// Terminal state of a table in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableState {
    Done,
    Failed,
    /// Never started
    Skipped,
}

/// Why a table never started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A table in an earlier tier failed
    UpstreamTierFailed,
    /// The run was cancelled before the table started
    Cancelled,
}

/// Error taxonomy used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CyclicDependency,
    SchemaInconsistency,
    StageTimeout,
    ExecutorError,
    MappingFileMalformed,
    TemplateError,
    Io,
}

/// An error that failed a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Reference values that had no surrogate key and were merged as NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    pub table: TableName,
    pub query_file: String,
    pub column: ColumnName,
    pub referenced_table: TableName,
    pub rows: usize,
}

/// Outcome of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: TableName,
    /// Zero-based tier index
    pub tier: usize,
    pub state: TableState,
    /// Last stage entered
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<TableError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dangling_references: Vec<DanglingReference>,
    pub duration_ms: u64,
}

impl TableOutcome {
    /// Outcome of a table that never started
    pub fn skipped(table: TableName, tier: usize, reason: SkipReason) -> Self {
        Self {
            table,
            tier,
            state: TableState::Skipped,
            stage: Stage::Start,
            skip_reason: Some(reason),
            errors: Vec::new(),
            dangling_references: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Report of a whole pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_table: Option<TableName>,
    pub skip_mapping_upload: bool,
    pub tiers: Vec<Vec<TableName>>,
    pub tables: Vec<TableOutcome>,
    /// Mappings marked invalid at the end of the run, when invalidation ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_mappings_invalidated: Option<usize>,
    pub cancelled: bool,
    /// Errors outside any single table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_errors: Vec<String>,
}

impl RunReport {
    /// Start a new report with a fresh run id
    pub fn start(
        tiers: &[ExecutionTier],
        only_table: Option<TableName>,
        skip_mapping_upload: bool,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            only_table,
            skip_mapping_upload,
            tiers: tiers.iter().map(|t| t.tables().to_vec()).collect(),
            tables: Vec::new(),
            stale_mappings_invalidated: None,
            cancelled: false,
            run_errors: Vec::new(),
        }
    }

    /// The run's start date, used as the mapping freshness cutoff
    pub fn run_date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }

    /// Add a table outcome
    pub fn record(&mut self, outcome: TableOutcome) {
        self.tables.push(outcome);
    }

    /// Stamp the end time and order outcomes by tier, then table name
    pub fn finish(&mut self) {
        self.tables
            .sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.table.cmp(&b.table)));
        self.finished_at = Some(Utc::now());
    }

    /// Outcome of one table
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|o| o.table == table)
    }

    /// Number of tables in `state`
    pub fn count(&self, state: TableState) -> usize {
        self.tables.iter().filter(|o| o.state == state).count()
    }

    /// Whether any table failed
    pub fn has_failures(&self) -> bool {
        self.count(TableState::Failed) > 0
    }

    /// Failed table outcomes
    pub fn failures(&self) -> impl Iterator<Item = &TableOutcome> {
        self.tables.iter().filter(|o| o.state == TableState::Failed)
    }

    /// Every dangling reference across all tables
    pub fn dangling_references(&self) -> impl Iterator<Item = &DanglingReference> {
        self.tables.iter().flat_map(|o| o.dangling_references.iter())
    }

    /// Process exit status: non-zero iff any table failed
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }

    /// Load a saved report
    pub fn load(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Save the report atomically (write to a temp file, then rename)
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(self)?)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "report_test.rs"]
mod tests;
