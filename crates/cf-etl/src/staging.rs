//! Runs query files into work tables

use crate::context::EtlContext;
use crate::error::EtlResult;
use cf_core::{EventReference, QueryFile, TableName};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

/// A query file together with what it references
#[derive(Debug, Clone)]
pub(crate) struct PlannedQuery {
    pub file: QueryFile,
    pub events: Vec<EventReference>,
}

/// A query file whose results sit in a work table
#[derive(Debug, Clone)]
pub(crate) struct StagedQuery {
    pub file: QueryFile,
    pub events: Vec<EventReference>,
    pub work_table: String,
    /// Lowercased column names of the work table
    pub columns: Vec<String>,
}

impl StagedQuery {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Serialize)]
struct QueryBindings<'a> {
    raw: &'a str,
    work: &'a str,
    omop: &'a str,
    table: &'a str,
}

#[derive(Serialize)]
struct WorkTableContext<'a> {
    work_table: &'a str,
    query: &'a str,
}

/// Read a query file, rendering it when it is a template
async fn query_text(ctx: &EtlContext, table: &TableName, file: &QueryFile) -> EtlResult<String> {
    let source = tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|e| crate::error::EtlError::Io {
            path: file.path.display().to_string(),
            source: e,
        })?;

    let query = if file.templated {
        ctx.renderer.render_query(
            &source,
            QueryBindings {
                raw: ctx.tables.raw_schema(),
                work: ctx.tables.work_schema(),
                omop: ctx.tables.omop_schema(),
                table: table.as_str(),
            },
        )?
    } else {
        source
    };
    Ok(query.trim().trim_end_matches(';').trim_end().to_string())
}

async fn stage_one(
    ctx: &EtlContext,
    table: &TableName,
    planned: &PlannedQuery,
) -> EtlResult<StagedQuery> {
    let query = query_text(ctx, table, &planned.file).await?;
    let work_table = ctx.tables.query(table, &planned.file);
    let sql = ctx.renderer.render(
        "work_table_create",
        WorkTableContext {
            work_table: &work_table,
            query: &query,
        },
    )?;
    ctx.warehouse.execute_batch(&sql).await?;

    let columns = ctx
        .warehouse
        .read_columns(&work_table)
        .await?
        .into_iter()
        .map(|c| c.name.to_ascii_lowercase())
        .collect();
    log::debug!("{}: staged {} into {}", table, planned.file.file_name(), work_table);

    Ok(StagedQuery {
        file: planned.file.clone(),
        events: planned.events.clone(),
        work_table,
        columns,
    })
}

/// Stage every planned query, at most `max_parallel_queries` at a time.
/// Results keep the order of `planned`.
pub(crate) async fn stage_queries(
    ctx: &EtlContext,
    table: &TableName,
    planned: &[PlannedQuery],
) -> EtlResult<Vec<StagedQuery>> {
    let pending: Vec<BoxFuture<'_, EtlResult<(usize, StagedQuery)>>> = planned
        .iter()
        .enumerate()
        .map(|(index, query)| {
            async move { stage_one(ctx, table, query).await.map(|s| (index, s)) }.boxed()
        })
        .collect();
    let mut staged: Vec<(usize, StagedQuery)> = stream::iter(pending)
        .buffer_unordered(ctx.options.max_parallel_queries.max(1))
        .try_collect()
        .await?;
    staged.sort_by_key(|(index, _)| *index);
    Ok(staged.into_iter().map(|(_, s)| s).collect())
}
