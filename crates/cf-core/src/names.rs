//! Strongly-typed table and column names.

use crate::identifier::define_identifier;

define_identifier! {
    /// Name of a catalog table such as `visit_occurrence`.
    pub struct TableName;
}

define_identifier! {
    /// Name of a column within a catalog table such as `person_id`.
    pub struct ColumnName;
}

impl ColumnName {
    /// Whether the column holds a concept code that goes through concept mapping.
    ///
    /// Every `*concept_id*` column qualifies except the `*_source_concept_id`
    /// columns, which keep the source vocabulary's own concept.
    pub fn is_concept_column(&self) -> bool {
        self.contains("concept_id") && !self.contains("source_concept_id")
    }
}

#[cfg(test)]
#[path = "names_test.rs"]
mod tests;
