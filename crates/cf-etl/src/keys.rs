//! Surrogate keys
//!
//! Source primary keys are replaced by integers that stay stable across runs.
//! The map of source value to surrogate id lives in `<pk>_swap` in the work
//! schema; foreign keys and event references resolve through the swap table
//! of the referenced table.

use crate::context::EtlContext;
use crate::error::{EtlError, EtlResult};
use crate::staging::StagedQuery;
use cf_core::{ColumnName, ColumnSpec, CoreResult, DanglingReference, TableName, TableSpec};
use serde::Serialize;

/// The primary key when it is numbered by the pipeline
pub(crate) fn auto_numbered_key(spec: &TableSpec) -> CoreResult<Option<&ColumnSpec>> {
    Ok(spec
        .primary_key_column()?
        .filter(|pk| pk.data_type.is_integer()))
}

/// Swap table through which values of `column` resolve, if the column
/// references an auto-numbered table
pub(crate) fn reference_swap(
    ctx: &EtlContext,
    spec: &TableSpec,
    staged: &StagedQuery,
    column: &ColumnName,
) -> CoreResult<Option<(TableName, String)>> {
    if let Some(event) = staged.events.iter().find(|e| &e.column == column) {
        return Ok(Some((
            event.table.clone(),
            ctx.tables.pk_swap(&event.key_column),
        )));
    }
    let Some(referenced) = spec.foreign_key(column) else {
        return Ok(None);
    };
    let target = ctx.catalog.table(referenced)?;
    Ok(auto_numbered_key(target)?
        .map(|pk| (referenced.clone(), ctx.tables.pk_swap(&pk.name))))
}

#[derive(Serialize)]
struct SwapContext<'a> {
    swap: &'a str,
}

#[derive(Serialize)]
struct SwapMergeContext<'a> {
    swap: &'a str,
    target: &'a str,
    primary_key: &'a str,
    work_tables: Vec<&'a str>,
}

/// Number the new source keys of every staged query.
/// Returns the number of new surrogate ids.
pub(crate) async fn swap_keys(
    ctx: &EtlContext,
    spec: &TableSpec,
    staged: &[StagedQuery],
) -> EtlResult<usize> {
    let Some(pk) = auto_numbered_key(spec)? else {
        return Ok(0);
    };
    if staged.is_empty() {
        return Ok(0);
    }
    if let Some(query) = staged.iter().find(|q| !q.has_column(&pk.name)) {
        return Err(EtlError::schema(
            &spec.name,
            format!(
                "query file {} does not select primary key {}",
                query.file.file_name(),
                pk.name
            ),
        ));
    }

    let swap = ctx.tables.pk_swap(&pk.name);
    let sql = ctx
        .renderer
        .render("pk_swap_create", SwapContext { swap: &swap })?;
    ctx.warehouse.execute_batch(&sql).await?;

    let sql = ctx.renderer.render(
        "pk_swap_merge",
        SwapMergeContext {
            swap: &swap,
            target: &ctx.tables.omop(&spec.name),
            primary_key: pk.name.as_str(),
            work_tables: staged.iter().map(|q| q.work_table.as_str()).collect(),
        },
    )?;
    let added = ctx.warehouse.execute(&sql).await?;
    log::info!("{}: {} new surrogate keys in {}", spec.name, added, swap);
    Ok(added)
}

#[derive(Serialize)]
struct DanglingContext<'a> {
    work_table: &'a str,
    column: &'a str,
    swap: Option<&'a str>,
}

/// Count reference values without a surrogate key, per query file and column
pub(crate) async fn dangling_references(
    ctx: &EtlContext,
    spec: &TableSpec,
    staged: &[StagedQuery],
) -> EtlResult<Vec<DanglingReference>> {
    let mut found = Vec::new();
    for query in staged {
        let columns = spec
            .foreign_keys
            .iter()
            .map(|(column, _)| column)
            .chain(spec.polymorphic_columns.iter());
        for column in columns {
            if !query.has_column(column) {
                continue;
            }
            let Some((referenced_table, swap)) = reference_swap(ctx, spec, query, column)? else {
                continue;
            };
            let swap_exists = ctx.warehouse.relation_exists(&swap).await?;
            let sql = ctx.renderer.render(
                "dangling_reference_count",
                DanglingContext {
                    work_table: &query.work_table,
                    column: column.as_str(),
                    swap: swap_exists.then_some(swap.as_str()),
                },
            )?;
            let rows = ctx.warehouse.query_count(&sql).await?;
            if rows > 0 {
                log::warn!(
                    "{}: {} rows of {} reference {} values with no surrogate key ({}); they are merged as NULL",
                    spec.name,
                    rows,
                    query.file.file_name(),
                    referenced_table,
                    column
                );
                found.push(DanglingReference {
                    table: spec.name.clone(),
                    query_file: query.file.file_name(),
                    column: column.clone(),
                    referenced_table,
                    rows,
                });
            }
        }
    }
    Ok(found)
}
