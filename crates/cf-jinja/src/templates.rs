//! Embedded statement templates, keyed by dialect and name.

/// Dialect whose templates are bundled
pub const DUCKDB: &str = "duckdb";

macro_rules! duckdb_template {
    ($name:literal) => {
        (
            $name,
            include_str!(concat!("../templates/duckdb/", $name, ".sql.jinja")),
        )
    };
}

const DUCKDB_TEMPLATES: &[(&str, &str)] = &[
    duckdb_template!("create_schemas"),
    duckdb_template!("create_cdm_table"),
    duckdb_template!("truncate"),
    duckdb_template!("concept_id_swap_create"),
    duckdb_template!("custom_concept_assign_ids"),
    duckdb_template!("concept_merge"),
    duckdb_template!("usagi_swap"),
    duckdb_template!("source_to_concept_map_merge"),
    duckdb_template!("source_to_concept_map_invalidate"),
    duckdb_template!("source_to_concept_map_remove"),
    duckdb_template!("work_table_create"),
    duckdb_template!("pk_swap_create"),
    duckdb_template!("pk_swap_merge"),
    duckdb_template!("dangling_reference_count"),
    duckdb_template!("table_merge"),
    duckdb_template!("custom_concepts_remove"),
    duckdb_template!("custom_concepts_remove_by_upload"),
    duckdb_template!("vocabulary_replace"),
];

/// Statement templates for a dialect, `None` when the dialect is not bundled
pub fn dialect_templates(dialect: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match dialect {
        DUCKDB => Some(DUCKDB_TEMPLATES),
        _ => None,
    }
}
