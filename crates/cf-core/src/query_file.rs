//! Source query files and the references inferred from their names

use crate::catalog::{CatalogSchema, SchemaCatalog, TableSpec};
use crate::error::{CoreError, CoreResult};
use crate::names::{ColumnName, TableName};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Table whose event references resolve through `person_id`
pub const DEATH_TABLE: &str = "death";

/// A `.sql` or `.sql.jinja` file that stages rows for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFile {
    pub path: PathBuf,
    /// File name without the `.sql` / `.sql.jinja` extension, lowercased
    pub stem: String,
    /// Whether the file is rendered as a template before execution
    pub templated: bool,
}

impl QueryFile {
    /// Recognize a query file by its extension
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_ascii_lowercase())
            .unwrap_or_default();

        let (stem, templated) = if let Some(stem) = file_name.strip_suffix(".sql.jinja") {
            (stem, true)
        } else if let Some(stem) = file_name.strip_suffix(".sql") {
            (stem, false)
        } else {
            return Err(CoreError::InvalidQueryFileName {
                file: path.display().to_string(),
                reason: "expected a .sql or .sql.jinja extension".into(),
            });
        };

        if stem.is_empty() {
            return Err(CoreError::InvalidQueryFileName {
                file: path.display().to_string(),
                reason: "empty file stem".into(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            stem: stem.to_string(),
            templated,
        })
    }

    /// Name of the work table holding this query's results: `<table>__<stem>`
    pub fn work_table(&self, table: &TableName) -> String {
        let stem: String = self
            .stem
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}__{}", table, stem)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.stem.clone())
    }
}

/// A polymorphic column bound to a concrete referenced table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventReference {
    pub column: ColumnName,
    pub table: TableName,
    /// Key column of `table` whose source values the event column holds
    pub key_column: ColumnName,
}

/// Infer the referenced tables of `spec`'s polymorphic columns from a query file.
///
/// Referenced table names are read as `_<table>` suffixes of the file stem,
/// the last suffix binding the last polymorphic column. A table with a single
/// polymorphic column treats the suffix as optional; with several, every
/// suffix is required.
pub fn infer_event_references(
    catalog: &SchemaCatalog,
    spec: &TableSpec,
    file: &QueryFile,
) -> CoreResult<Vec<EventReference>> {
    match spec.polymorphic_columns.as_slice() {
        [] => Ok(Vec::new()),
        [column] => match peel_table_suffix(catalog, &file.stem) {
            Some((_, target)) => Ok(vec![event_reference(column, target, file)?]),
            None => {
                log::debug!(
                    "{}: no event table suffix, {} left unresolved",
                    file.file_name(),
                    column
                );
                Ok(Vec::new())
            }
        },
        columns => {
            let mut rest = file.stem.as_str();
            let mut bound = Vec::with_capacity(columns.len());
            for column in columns.iter().rev() {
                let (prefix, target) = peel_table_suffix(catalog, rest).ok_or_else(|| {
                    CoreError::InvalidQueryFileName {
                        file: file.file_name(),
                        reason: format!(
                            "expected <name>{} naming the referenced tables of {}",
                            "_<table>".repeat(columns.len()),
                            spec.name
                        ),
                    }
                })?;
                bound.push(event_reference(column, target, file)?);
                rest = prefix;
            }
            bound.reverse();
            Ok(bound)
        }
    }
}

/// Split the longest `_<cdm table>` suffix off `stem`, keeping a non-empty prefix
fn peel_table_suffix<'c, 's>(
    catalog: &'c SchemaCatalog,
    stem: &'s str,
) -> Option<(&'s str, &'c TableSpec)> {
    catalog
        .tables()
        .filter(|t| t.schema == CatalogSchema::Cdm)
        .filter_map(|t| {
            stem.strip_suffix(t.name.as_str())
                .and_then(|prefix| prefix.strip_suffix('_'))
                .filter(|prefix| !prefix.is_empty())
                .map(|prefix| (prefix, t))
        })
        .max_by_key(|(_, t)| t.name.len())
}

fn event_reference(
    column: &ColumnName,
    target: &TableSpec,
    file: &QueryFile,
) -> CoreResult<EventReference> {
    let key_column = if target.name == DEATH_TABLE {
        target.foreign_keys.iter().find(|(_, t)| t == "person").map(|(c, _)| c.clone())
    } else {
        target
            .primary_key_column()?
            .filter(|pk| pk.data_type.is_integer())
            .map(|pk| pk.name.clone())
    };

    let key_column = key_column.ok_or_else(|| CoreError::InvalidQueryFileName {
        file: file.file_name(),
        reason: format!("table '{}' has no surrogate key to reference", target.name),
    })?;

    Ok(EventReference {
        column: column.clone(),
        table: target.name.clone(),
        key_column,
    })
}

#[cfg(test)]
#[path = "query_file_test.rs"]
mod tests;
