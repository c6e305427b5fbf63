//! Custom concepts and Usagi code mappings
//!
//! Custom concepts get ids above [`CUSTOM_CONCEPT_ID_FLOOR`] that stay stable
//! across runs through the `concept_id_swap` table, keyed by source code and
//! domain. Approved Usagi mappings are kept in `source_to_concept_map` under
//! the vocabulary id `<table>__<column>`.

use crate::context::EtlContext;
use crate::error::{EtlError, EtlResult};
use crate::loader::load_files;
use crate::work_tables::{
    mapping_vocabulary_id, CONCEPT_TABLE, CUSTOM_CONCEPT_ID_FLOOR, SOURCE_TO_CONCEPT_MAP_TABLE,
};
use cf_core::{CdmDataType, ColumnName, TableName};
use cf_db::{CsvFormat, TypedColumn};
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex;

/// Columns of a `*_concept.csv` file; `concept_id` holds the source code
pub fn custom_concept_columns() -> Vec<TypedColumn> {
    let text = CdmDataType::Varchar(None);
    vec![
        TypedColumn::new("concept_id", text),
        TypedColumn::new("concept_name", text),
        TypedColumn::new("domain_id", text),
        TypedColumn::new("vocabulary_id", text),
        TypedColumn::new("concept_class_id", text),
        TypedColumn::new("standard_concept", text),
        TypedColumn::new("concept_code", text),
        TypedColumn::new("valid_start_date", CdmDataType::Date),
        TypedColumn::new("valid_end_date", CdmDataType::Date),
        TypedColumn::new("invalid_reason", text),
    ]
}

/// Columns read from a Usagi export
///
/// `conceptId` stays text: it holds either a vocabulary concept id or the
/// source code of a custom concept.
pub fn usagi_columns() -> Vec<TypedColumn> {
    let text = CdmDataType::Varchar(None);
    vec![
        TypedColumn::new("sourceCode", text).alias("source_code"),
        TypedColumn::new("sourceName", text).alias("source_name"),
        TypedColumn::new("mappingStatus", text).alias("mapping_status"),
        TypedColumn::new("conceptId", text).alias("concept_id"),
        TypedColumn::new("conceptName", text).alias("concept_name"),
        TypedColumn::new("domainId", text).alias("domain_id"),
    ]
}

/// Hands out custom concept ids.
///
/// Each assignment numbers its new codes above the highest id already in
/// `concept_id_swap` or `concept`, read inside the same INSERT. Nothing is
/// cached between assignments, so a timed-out INSERT that still commits
/// cannot make a later one reuse its ids.
#[derive(Debug, Default)]
pub struct ConceptIdAllocator {
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct AssignContext<'a> {
    swap: &'a str,
    upload: &'a str,
    concept: &'a str,
    floor: i64,
}

impl ConceptIdAllocator {
    /// Give every new source code + domain pair in `upload` an id
    pub(crate) async fn assign(&self, ctx: &EtlContext, upload: &str) -> EtlResult<usize> {
        let sql = ctx.renderer.render(
            "custom_concept_assign_ids",
            AssignContext {
                swap: &ctx.tables.concept_id_swap(),
                upload,
                concept: &ctx.tables.omop(CONCEPT_TABLE),
                floor: CUSTOM_CONCEPT_ID_FLOOR,
            },
        )?;
        let _serialized = self.lock.lock().await;
        let inserted = ctx.warehouse.execute(&sql).await?;
        Ok(inserted)
    }
}

#[derive(Serialize)]
struct TableContext<'a> {
    swap: &'a str,
}

/// Create the custom concept id map when it does not exist yet
pub(crate) async fn ensure_concept_id_swap(ctx: &EtlContext) -> EtlResult<()> {
    let sql = ctx.renderer.render(
        "concept_id_swap_create",
        TableContext {
            swap: &ctx.tables.concept_id_swap(),
        },
    )?;
    ctx.warehouse.execute_batch(&sql).await?;
    Ok(())
}

#[derive(Serialize)]
struct ConceptMergeContext<'a> {
    swap: &'a str,
    upload: &'a str,
    concept: &'a str,
}

/// Upload the custom concepts of one column, number them and merge them
/// into `concept`. Returns the number of newly numbered concepts.
pub(crate) async fn load_custom_concepts(
    ctx: &EtlContext,
    table: &TableName,
    column: &ColumnName,
) -> EtlResult<usize> {
    let files = ctx.folder.custom_concept_files(table, column)?;
    if files.is_empty() {
        return Ok(0);
    }

    let upload = ctx.tables.concept_upload(table, column);
    load_files(
        ctx,
        &files,
        &custom_concept_columns(),
        &CsvFormat::default(),
        &upload,
        &format!("{}/{}/custom", table, column),
    )
    .await
    .map_err(EtlError::mapping_file)?;

    let assigned = ctx.concept_ids.assign(ctx, &upload).await?;

    let sql = ctx.renderer.render(
        "concept_merge",
        ConceptMergeContext {
            swap: &ctx.tables.concept_id_swap(),
            upload: &upload,
            concept: &ctx.tables.omop(CONCEPT_TABLE),
        },
    )?;
    {
        let _guard = ctx.catalog_writes.lock().await;
        ctx.warehouse.execute_atomic(&sql).await?;
    }

    log::info!(
        "{}.{}: {} new custom concepts numbered",
        table,
        column,
        assigned
    );
    Ok(assigned)
}

#[derive(Serialize)]
struct UsagiSwapContext<'a> {
    swap: &'a str,
    upload: &'a str,
    mapping: &'a str,
}

#[derive(Serialize)]
struct MappingMergeContext<'a> {
    stcm: &'a str,
    concept: &'a str,
    mapping: &'a str,
    vocabulary_id: &'a str,
    run_date: String,
}

/// Upload the Usagi exports of one column, swap custom concept codes for
/// their ids and upsert the approved mappings into `source_to_concept_map`.
/// Returns the number of Usagi rows read.
pub(crate) async fn load_code_mappings(
    ctx: &EtlContext,
    table: &TableName,
    column: &ColumnName,
    run_date: NaiveDate,
) -> EtlResult<usize> {
    let files = ctx.folder.usagi_files(table, column)?;
    if files.is_empty() {
        return Ok(0);
    }

    let upload = ctx.tables.usagi_upload(table, column);
    let mapping = ctx.tables.usagi_mapping(table, column);
    let rows = load_files(
        ctx,
        &files,
        &usagi_columns(),
        &CsvFormat::default(),
        &upload,
        &format!("{}/{}", table, column),
    )
    .await
    .map_err(EtlError::mapping_file)?;

    let sql = ctx.renderer.render(
        "usagi_swap",
        UsagiSwapContext {
            swap: &ctx.tables.concept_id_swap(),
            upload: &upload,
            mapping: &mapping,
        },
    )?;
    ctx.warehouse.execute_batch(&sql).await?;

    let sql = ctx.renderer.render(
        "source_to_concept_map_merge",
        MappingMergeContext {
            stcm: &ctx.tables.omop(SOURCE_TO_CONCEPT_MAP_TABLE),
            concept: &ctx.tables.omop(CONCEPT_TABLE),
            mapping: &mapping,
            vocabulary_id: &mapping_vocabulary_id(table, column),
            run_date: run_date.format("%Y-%m-%d").to_string(),
        },
    )?;
    {
        let _guard = ctx.catalog_writes.lock().await;
        ctx.warehouse.execute_atomic(&sql).await?;
    }

    log::info!("{}.{}: {} Usagi rows loaded", table, column, rows);
    Ok(rows)
}

#[derive(Serialize)]
struct InvalidateContext<'a> {
    stcm: &'a str,
    run_date: String,
}

/// Mark every mapping not refreshed on `run_date` as deleted
pub(crate) async fn invalidate_stale_mappings(
    ctx: &EtlContext,
    run_date: NaiveDate,
) -> EtlResult<usize> {
    let sql = ctx.renderer.render(
        "source_to_concept_map_invalidate",
        InvalidateContext {
            stcm: &ctx.tables.omop(SOURCE_TO_CONCEPT_MAP_TABLE),
            run_date: run_date.format("%Y-%m-%d").to_string(),
        },
    )?;
    let _guard = ctx.catalog_writes.lock().await;
    let invalidated = ctx.warehouse.execute(&sql).await?;
    log::info!("{} stale source_to_concept_map rows invalidated", invalidated);
    Ok(invalidated)
}
