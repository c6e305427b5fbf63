//! Layout of the CDM folder
//!
//! ```text
//! <cdm_folder>/<table>/*.sql
//! <cdm_folder>/<table>/*.sql.jinja
//! <cdm_folder>/<table>/<concept column>/*_usagi.csv
//! <cdm_folder>/<table>/<concept column>/custom/*_concept.csv
//! ```

use crate::error::{EtlError, EtlResult};
use cf_core::{ColumnName, QueryFile, TableName, TableSpec};
use std::path::{Path, PathBuf};

/// The project folder holding queries and mapping files per table
#[derive(Debug, Clone)]
pub struct CdmFolder {
    root: PathBuf,
}

impl CdmFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, table: &TableName) -> PathBuf {
        self.root.join(table.as_str())
    }

    /// `.sql` files, then `.sql.jinja` files, each in name order
    pub fn query_files(&self, table: &TableName) -> EtlResult<Vec<QueryFile>> {
        let dir = self.table_dir(table);
        let mut files = Vec::new();
        for extension in ["sql", "sql.jinja"] {
            for path in glob_sorted(&dir, &format!("*.{}", extension))? {
                files.push(QueryFile::from_path(&path)?);
            }
        }
        Ok(files)
    }

    /// Concept columns of `spec` that have a mapping folder
    pub fn mapped_columns(&self, spec: &TableSpec) -> Vec<ColumnName> {
        let dir = self.table_dir(&spec.name);
        spec.concept_columns
            .iter()
            .filter(|column| dir.join(column.as_str()).is_dir())
            .cloned()
            .collect()
    }

    /// `<table>/<column>/custom/*_concept.csv`
    pub fn custom_concept_files(
        &self,
        table: &TableName,
        column: &ColumnName,
    ) -> EtlResult<Vec<PathBuf>> {
        let dir = self.table_dir(table).join(column.as_str()).join("custom");
        glob_sorted(&dir, "*_concept.csv")
    }

    /// `<table>/<column>/*_usagi.csv`
    pub fn usagi_files(&self, table: &TableName, column: &ColumnName) -> EtlResult<Vec<PathBuf>> {
        let dir = self.table_dir(table).join(column.as_str());
        glob_sorted(&dir, "*_usagi.csv")
    }
}

fn glob_sorted(dir: &Path, file_pattern: &str) -> EtlResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.display().to_string()),
        file_pattern
    );
    let entries = glob::glob(&pattern).map_err(|e| EtlError::Pattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| EtlError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
#[path = "folder_test.rs"]
mod tests;
