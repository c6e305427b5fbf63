//! Names of the warehouse tables the pipeline reads and writes

use cf_core::{ColumnName, QueryFile, SchemaNames, TableName};

/// Custom concepts are numbered above this id
pub const CUSTOM_CONCEPT_ID_FLOOR: i64 = 2_000_000_000;

pub const CONCEPT_TABLE: &str = "concept";
pub const CONCEPT_RELATIONSHIP_TABLE: &str = "concept_relationship";
pub const CONCEPT_ANCESTOR_TABLE: &str = "concept_ancestor";
pub const SOURCE_TO_CONCEPT_MAP_TABLE: &str = "source_to_concept_map";
pub const CONCEPT_ID_SWAP_TABLE: &str = "concept_id_swap";

const CUSTOM_CONCEPT_SUFFIX: &str = "_concept";
const USAGI_UPLOAD_SUFFIX: &str = "_usagi_upload";
const USAGI_MAPPING_SUFFIX: &str = "_usagi";

/// `source_vocabulary_id` of the mappings for one concept column
pub fn mapping_vocabulary_id(table: &TableName, column: &ColumnName) -> String {
    format!("{}__{}", table, column)
}

/// Prefix shared by every work table of `table`
pub fn work_table_prefix(table: &TableName) -> String {
    format!("{}__", table)
}

/// Schema-qualified table names
#[derive(Debug, Clone)]
pub struct WorkTables {
    raw: String,
    work: String,
    omop: String,
}

impl WorkTables {
    pub fn new(schemas: &SchemaNames) -> Self {
        Self {
            raw: schemas.raw.clone(),
            work: schemas.work.clone(),
            omop: schemas.omop.clone(),
        }
    }

    pub fn raw_schema(&self) -> &str {
        &self.raw
    }

    pub fn work_schema(&self) -> &str {
        &self.work
    }

    pub fn omop_schema(&self) -> &str {
        &self.omop
    }

    /// A table in the omop schema
    pub fn omop(&self, table: &str) -> String {
        format!("{}.{}", self.omop, table)
    }

    /// A table in the work schema
    pub fn work(&self, name: &str) -> String {
        format!("{}.{}", self.work, name)
    }

    /// Results of one query file
    pub fn query(&self, table: &TableName, file: &QueryFile) -> String {
        self.work(&file.work_table(table))
    }

    /// Uploaded custom concepts of one column
    pub fn concept_upload(&self, table: &TableName, column: &ColumnName) -> String {
        self.work(&format!(
            "{}{}",
            mapping_vocabulary_id(table, column),
            CUSTOM_CONCEPT_SUFFIX
        ))
    }

    /// Uploaded Usagi rows of one column
    pub fn usagi_upload(&self, table: &TableName, column: &ColumnName) -> String {
        self.work(&format!(
            "{}{}",
            mapping_vocabulary_id(table, column),
            USAGI_UPLOAD_SUFFIX
        ))
    }

    /// Usagi rows with custom concepts swapped for their ids
    pub fn usagi_mapping(&self, table: &TableName, column: &ColumnName) -> String {
        self.work(&format!(
            "{}{}",
            mapping_vocabulary_id(table, column),
            USAGI_MAPPING_SUFFIX
        ))
    }

    pub fn concept_id_swap(&self) -> String {
        self.work(CONCEPT_ID_SWAP_TABLE)
    }

    /// Source to surrogate id map of a primary key column
    pub fn pk_swap(&self, key_column: &ColumnName) -> String {
        self.work(&format!("{}_swap", key_column))
    }

    /// Upload table of one vocabulary snapshot file
    pub fn vocabulary_upload(&self, table: &TableName) -> String {
        self.work(&format!("vocab__{}", table))
    }
}

/// What an existing work table of a table holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkTableKind {
    /// Custom concept upload
    CustomConcepts,
    /// Swapped Usagi mapping, with the mapping's `source_vocabulary_id`
    UsagiMapping(String),
    Other,
}

/// Classify an unqualified work table name
pub fn classify_work_table(name: &str) -> WorkTableKind {
    if name.ends_with(CUSTOM_CONCEPT_SUFFIX) {
        WorkTableKind::CustomConcepts
    } else if let Some(vocabulary_id) = name.strip_suffix(USAGI_MAPPING_SUFFIX) {
        WorkTableKind::UsagiMapping(vocabulary_id.to_string())
    } else {
        WorkTableKind::Other
    }
}
