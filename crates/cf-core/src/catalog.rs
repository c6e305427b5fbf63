//! Schema catalog: static metadata describing every target table.
//!
//! The catalog is loaded once from YAML (the bundled OMOP CDM 5.4 definition
//! or a project supplied file), validated, and then shared read-only by the
//! resolver and the pipeline.

use crate::error::{CoreError, CoreResult};
use crate::names::{ColumnName, TableName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The bundled OMOP CDM 5.4 catalog.
pub const CDM_V54_CATALOG: &str = include_str!("../catalog/cdm_5.4.yml");

/// The one vocabulary table that takes part in the ETL next to the `cdm` tables.
pub const VOCABULARY_TABLE: &str = "vocabulary";

/// Which part of the data model a table belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSchema {
    /// Clinical, health system, economics, derived and metadata tables
    Cdm,
    /// Standardized vocabulary tables
    Vocab,
}

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdmDataType {
    Integer,
    Float,
    Date,
    DateTime,
    /// `varchar(n)`, or `varchar(max)` when the length is `None`
    Varchar(Option<u32>),
}

impl CdmDataType {
    /// Integer typed keys get surrogate numbering
    pub fn is_integer(self) -> bool {
        matches!(self, CdmDataType::Integer)
    }
}

impl FromStr for CdmDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "integer" => return Ok(CdmDataType::Integer),
            "float" => return Ok(CdmDataType::Float),
            "date" => return Ok(CdmDataType::Date),
            "datetime" => return Ok(CdmDataType::DateTime),
            _ => {}
        }
        let length = lower
            .strip_prefix("varchar(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| format!("unknown column type '{}'", s))?;
        if length == "max" {
            return Ok(CdmDataType::Varchar(None));
        }
        length
            .parse::<u32>()
            .map(|n| CdmDataType::Varchar(Some(n)))
            .map_err(|_| format!("invalid varchar length in '{}'", s))
    }
}

impl fmt::Display for CdmDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdmDataType::Integer => write!(f, "integer"),
            CdmDataType::Float => write!(f, "float"),
            CdmDataType::Date => write!(f, "date"),
            CdmDataType::DateTime => write!(f, "datetime"),
            CdmDataType::Varchar(Some(n)) => write!(f, "varchar({})", n),
            CdmDataType::Varchar(None) => write!(f, "varchar(max)"),
        }
    }
}

impl<'de> Deserialize<'de> for CdmDataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Authoritative correction of a mis-declared foreign key.
///
/// Overrides are part of the versioned catalog file and are applied on every
/// load, before any dependency graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogOverride {
    pub table: TableName,
    pub column: ColumnName,
    pub references: TableName,
}

/// One column of a catalog table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: ColumnName,
    pub data_type: CdmDataType,
    pub required: bool,
}

/// Immutable metadata for one target table
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: TableName,
    pub schema: CatalogSchema,
    /// Columns in declaration order
    pub columns: Vec<ColumnSpec>,
    /// Declared primary key; `None` means no surrogate key management
    pub primary_key: Option<ColumnName>,
    /// Foreign key columns in column order, mapped to the referenced table
    pub foreign_keys: Vec<(ColumnName, TableName)>,
    /// Columns that go through concept mapping
    pub concept_columns: Vec<ColumnName>,
    /// Columns whose referenced table is inferred per query file
    pub polymorphic_columns: Vec<ColumnName>,
}

impl TableSpec {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key column, checked against the declared columns.
    ///
    /// Returns `SchemaInconsistency` when the table declares a primary key
    /// that is not one of its columns.
    pub fn primary_key_column(&self) -> CoreResult<Option<&ColumnSpec>> {
        let Some(pk) = &self.primary_key else {
            return Ok(None);
        };
        self.column(pk)
            .map(Some)
            .ok_or_else(|| CoreError::SchemaInconsistency {
                table: self.name.to_string(),
                reason: format!("primary key column '{}' is not declared", pk),
            })
    }

    /// The table a foreign key column references
    pub fn foreign_key(&self, column: &str) -> Option<&TableName> {
        self.foreign_keys
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, t)| t)
    }

    /// Distinct referenced tables, excluding the table itself
    pub fn referenced_tables(&self) -> BTreeSet<TableName> {
        self.foreign_keys
            .iter()
            .map(|(_, t)| t)
            .filter(|t| **t != self.name)
            .cloned()
            .collect()
    }

    /// Whether the column's referenced table is inferred per query file
    pub fn is_polymorphic(&self, column: &str) -> bool {
        self.polymorphic_columns.iter().any(|c| c == column)
    }

    /// Whether the target column must reject NULL.
    ///
    /// Reference columns stay nullable even when required, so an unresolved
    /// reference can land as NULL instead of failing the merge.
    pub fn is_not_null(&self, column: &ColumnSpec) -> bool {
        column.required
            && self.foreign_key(&column.name).is_none()
            && !self.is_polymorphic(&column.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    version: String,
    #[serde(default)]
    overrides: Vec<CatalogOverride>,
    tables: BTreeMap<TableName, RawTable>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    schema: CatalogSchema,
    #[serde(default)]
    primary_key: Option<ColumnName>,
    columns: Vec<RawColumn>,
    #[serde(default)]
    polymorphic_columns: Vec<ColumnName>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawColumn {
    name: ColumnName,
    #[serde(rename = "type")]
    data_type: CdmDataType,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    references: Option<TableName>,
}

/// The complete, validated set of table specs
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    version: String,
    tables: BTreeMap<TableName, TableSpec>,
    overrides: Vec<CatalogOverride>,
}

impl SchemaCatalog {
    /// Load the bundled OMOP CDM 5.4 catalog
    pub fn cdm_v54() -> CoreResult<Self> {
        Self::from_yaml_str(CDM_V54_CATALOG)
    }

    /// Load a catalog file from disk
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a catalog document, applying its overrides
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let raw: RawCatalog =
            serde_yaml::from_str(content).map_err(|e| CoreError::CatalogParseError {
                message: e.to_string(),
            })?;

        let mut tables = BTreeMap::new();
        for (name, raw_table) in raw.tables {
            let spec = build_table_spec(name.clone(), raw_table)?;
            tables.insert(name, spec);
        }

        for ov in &raw.overrides {
            apply_override(&mut tables, ov)?;
        }

        for spec in tables.values() {
            for (column, target) in &spec.foreign_keys {
                if !tables.contains_key(target) {
                    return Err(CoreError::CatalogInvalid {
                        message: format!(
                            "{}.{} references unknown table '{}'",
                            spec.name, column, target
                        ),
                    });
                }
            }
        }

        log::debug!(
            "Loaded schema catalog v{} with {} tables and {} overrides",
            raw.version,
            tables.len(),
            raw.overrides.len()
        );

        Ok(Self {
            version: raw.version,
            tables,
            overrides: raw.overrides,
        })
    }

    /// Catalog version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look up a table, failing with `UnknownTable`
    pub fn table(&self, name: &str) -> CoreResult<&TableSpec> {
        self.get(name).ok_or_else(|| CoreError::UnknownTable {
            name: name.to_string(),
        })
    }

    /// Look up a table by name
    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.get(name)
    }

    /// All tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.values()
    }

    /// Overrides applied during load
    pub fn overrides(&self) -> &[CatalogOverride] {
        &self.overrides
    }

    /// The tables the ETL writes: every `cdm` table plus `vocabulary`
    pub fn etl_tables(&self) -> BTreeSet<TableName> {
        self.tables
            .values()
            .filter(|t| t.schema == CatalogSchema::Cdm || t.name == VOCABULARY_TABLE)
            .map(|t| t.name.clone())
            .collect()
    }
}

fn build_table_spec(name: TableName, raw: RawTable) -> CoreResult<TableSpec> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(raw.columns.len());
    let mut foreign_keys = Vec::new();
    let mut concept_columns = Vec::new();

    for col in raw.columns {
        if !seen.insert(col.name.clone()) {
            return Err(CoreError::CatalogInvalid {
                message: format!("duplicate column '{}' in table '{}'", col.name, name),
            });
        }
        if col.name.is_concept_column() {
            concept_columns.push(col.name.clone());
        }
        if let Some(target) = col.references {
            foreign_keys.push((col.name.clone(), target));
        }
        columns.push(ColumnSpec {
            name: col.name,
            data_type: col.data_type,
            required: col.required,
        });
    }

    for poly in &raw.polymorphic_columns {
        if !seen.contains(poly) {
            return Err(CoreError::CatalogInvalid {
                message: format!("polymorphic column '{}' not declared in '{}'", poly, name),
            });
        }
    }

    Ok(TableSpec {
        name,
        schema: raw.schema,
        columns,
        primary_key: raw.primary_key,
        foreign_keys,
        concept_columns,
        polymorphic_columns: raw.polymorphic_columns,
    })
}

fn apply_override(
    tables: &mut BTreeMap<TableName, TableSpec>,
    ov: &CatalogOverride,
) -> CoreResult<()> {
    let spec = tables
        .get_mut(&ov.table)
        .ok_or_else(|| CoreError::CatalogInvalid {
            message: format!("override names unknown table '{}'", ov.table),
        })?;

    if spec.column(&ov.column).is_none() {
        return Err(CoreError::CatalogInvalid {
            message: format!("override names unknown column '{}.{}'", ov.table, ov.column),
        });
    }

    let existing = spec.foreign_keys.iter().position(|(c, _)| *c == ov.column);
    match existing {
        Some(index) => spec.foreign_keys[index].1 = ov.references.clone(),
        None => {
            // keep foreign keys in column order
            let position = spec
                .columns
                .iter()
                .position(|c| c.name == ov.column)
                .unwrap_or(spec.columns.len());
            let insert_at = spec
                .foreign_keys
                .iter()
                .take_while(|(c, _)| {
                    spec.columns
                        .iter()
                        .position(|col| col.name == *c)
                        .is_some_and(|p| p < position)
                })
                .count();
            spec.foreign_keys
                .insert(insert_at, (ov.column.clone(), ov.references.clone()));
        }
    }

    log::debug!(
        "Catalog override: {}.{} -> {}",
        ov.table,
        ov.column,
        ov.references
    );
    Ok(())
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
