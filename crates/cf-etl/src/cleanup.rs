//! Removal of ETL output

use crate::concepts::ensure_concept_id_swap;
use crate::context::EtlContext;
use crate::error::EtlResult;
use crate::keys::auto_numbered_key;
use crate::work_tables::{
    classify_work_table, work_table_prefix, WorkTableKind, CONCEPT_ANCESTOR_TABLE, CONCEPT_TABLE,
    CONCEPT_RELATIONSHIP_TABLE, CUSTOM_CONCEPT_ID_FLOOR, SOURCE_TO_CONCEPT_MAP_TABLE,
};
use cf_core::{CoreError, TableName, VOCABULARY_TABLE};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// What `cleanup` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupScope {
    /// Every work table, mapping and ETL table
    All,
    /// The output and work tables of one table
    Table(TableName),
}

impl FromStr for CleanupScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(CleanupScope::All)
        } else {
            s.parse().map(CleanupScope::Table)
        }
    }
}

impl fmt::Display for CleanupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupScope::All => f.write_str("all"),
            CleanupScope::Table(t) => write!(f, "{}", t),
        }
    }
}

/// What a cleanup removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub dropped_tables: Vec<String>,
    pub emptied_tables: Vec<TableName>,
}

#[derive(Serialize)]
struct VocabularyTables<'a> {
    concept: &'a str,
    concept_relationship: &'a str,
    concept_ancestor: &'a str,
    floor: i64,
    swap: &'a str,
    upload: &'a str,
}

#[derive(Serialize)]
struct TruncateContext<'a> {
    table: &'a str,
}

#[derive(Serialize)]
struct MappingRemoveContext<'a> {
    stcm: &'a str,
    vocabulary_id: &'a str,
}

async fn empty_table(ctx: &EtlContext, table: &str) -> EtlResult<()> {
    let sql = ctx
        .renderer
        .render("truncate", TruncateContext { table })?;
    ctx.warehouse.execute_batch(&sql).await?;
    Ok(())
}

pub(crate) async fn cleanup(ctx: &EtlContext, scope: &CleanupScope) -> EtlResult<CleanupSummary> {
    match scope {
        CleanupScope::All => cleanup_all(ctx).await,
        CleanupScope::Table(table) => cleanup_table(ctx, table).await,
    }
}

async fn cleanup_all(ctx: &EtlContext) -> EtlResult<CleanupSummary> {
    let mut summary = CleanupSummary::default();
    let concept = ctx.tables.omop(CONCEPT_TABLE);
    let concept_relationship = ctx.tables.omop(CONCEPT_RELATIONSHIP_TABLE);
    let concept_ancestor = ctx.tables.omop(CONCEPT_ANCESTOR_TABLE);

    empty_table(ctx, &ctx.tables.omop(SOURCE_TO_CONCEPT_MAP_TABLE)).await?;
    let sql = ctx.renderer.render(
        "custom_concepts_remove",
        VocabularyTables {
            concept: &concept,
            concept_relationship: &concept_relationship,
            concept_ancestor: &concept_ancestor,
            floor: CUSTOM_CONCEPT_ID_FLOOR,
            swap: "",
            upload: "",
        },
    )?;
    ctx.warehouse.execute_atomic(&sql).await?;

    for name in ctx.warehouse.list_tables(ctx.tables.work_schema()).await? {
        let qualified = ctx.tables.work(&name);
        ctx.warehouse.drop_table(&qualified).await?;
        summary.dropped_tables.push(qualified);
    }

    for table in ctx.catalog.etl_tables() {
        if table == VOCABULARY_TABLE {
            continue;
        }
        empty_table(ctx, &ctx.tables.omop(&table)).await?;
        summary.emptied_tables.push(table);
    }

    log::info!(
        "Cleanup: dropped {} work tables, emptied {} tables",
        summary.dropped_tables.len(),
        summary.emptied_tables.len()
    );
    Ok(summary)
}

async fn cleanup_table(ctx: &EtlContext, table: &TableName) -> EtlResult<CleanupSummary> {
    let spec = ctx.catalog.table(table)?;
    if !ctx.catalog.etl_tables().contains(table) {
        return Err(CoreError::UnknownTable {
            name: table.to_string(),
        }
        .into());
    }

    let mut summary = CleanupSummary::default();
    let prefix = work_table_prefix(table);
    let concept = ctx.tables.omop(CONCEPT_TABLE);
    let concept_relationship = ctx.tables.omop(CONCEPT_RELATIONSHIP_TABLE);
    let concept_ancestor = ctx.tables.omop(CONCEPT_ANCESTOR_TABLE);
    let stcm = ctx.tables.omop(SOURCE_TO_CONCEPT_MAP_TABLE);
    let swap = ctx.tables.concept_id_swap();
    ensure_concept_id_swap(ctx).await?;

    let work_tables: Vec<String> = ctx
        .warehouse
        .list_tables(ctx.tables.work_schema())
        .await?
        .into_iter()
        .filter(|name| name.starts_with(&prefix))
        .collect();

    for name in &work_tables {
        let qualified = ctx.tables.work(name);
        let sql = match classify_work_table(name) {
            WorkTableKind::CustomConcepts => ctx.renderer.render(
                "custom_concepts_remove_by_upload",
                VocabularyTables {
                    concept: &concept,
                    concept_relationship: &concept_relationship,
                    concept_ancestor: &concept_ancestor,
                    floor: CUSTOM_CONCEPT_ID_FLOOR,
                    swap: &swap,
                    upload: &qualified,
                },
            )?,
            WorkTableKind::UsagiMapping(vocabulary_id) => ctx.renderer.render(
                "source_to_concept_map_remove",
                MappingRemoveContext {
                    stcm: &stcm,
                    vocabulary_id: &vocabulary_id,
                },
            )?,
            WorkTableKind::Other => continue,
        };
        ctx.warehouse.execute_atomic(&sql).await?;
    }

    for name in work_tables {
        let qualified = ctx.tables.work(&name);
        ctx.warehouse.drop_table(&qualified).await?;
        summary.dropped_tables.push(qualified);
    }

    if let Some(pk) = auto_numbered_key(spec)? {
        let swap = ctx.tables.pk_swap(&pk.name);
        if ctx.warehouse.relation_exists(&swap).await? {
            ctx.warehouse.drop_table(&swap).await?;
            summary.dropped_tables.push(swap);
        }
    }

    empty_table(ctx, &ctx.tables.omop(table)).await?;
    summary.emptied_tables.push(table.clone());

    log::info!(
        "Cleanup of {}: dropped {} work tables",
        table,
        summary.dropped_tables.len()
    );
    Ok(summary)
}
