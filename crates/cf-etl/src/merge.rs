//! Merge of staged rows into the target table

use crate::context::EtlContext;
use crate::error::EtlResult;
use crate::keys::{auto_numbered_key, reference_swap};
use crate::staging::StagedQuery;
use cf_core::TableSpec;
use serde::Serialize;
use std::collections::HashMap;

/// How a target column is filled from a work table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ColumnKind {
    /// Auto-numbered primary key, joined to its swap table
    SurrogateKey,
    /// Reference resolved through a swap table, NULL when unresolved
    ForeignKey,
    /// Code column with an uploaded mapping, 0 when unmapped
    MappedConcept,
    /// Code column without a mapping, taken as an integer when it is one, else 0
    Concept,
    /// Not selected by the query
    Missing,
    Plain,
}

#[derive(Debug, Serialize)]
pub(crate) struct MergeColumn {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(rename = "type")]
    pub data_type: String,
    pub swap: Option<String>,
    pub mapping: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MergeSource {
    pub query_file: String,
    pub work_table: String,
    pub columns: Vec<MergeColumn>,
}

#[derive(Debug, Serialize)]
struct MergeStatement<'a> {
    target: String,
    primary_key: Option<&'a str>,
    columns: Vec<&'a str>,
    sources: Vec<MergeSource>,
}

/// Caches relation existence checks for one merge
struct Relations<'c> {
    ctx: &'c EtlContext,
    known: HashMap<String, bool>,
}

impl<'c> Relations<'c> {
    async fn exists(&mut self, name: &str) -> EtlResult<bool> {
        if let Some(&exists) = self.known.get(name) {
            return Ok(exists);
        }
        let exists = self.ctx.warehouse.relation_exists(name).await?;
        self.known.insert(name.to_string(), exists);
        Ok(exists)
    }
}

async fn plan_source(
    relations: &mut Relations<'_>,
    spec: &TableSpec,
    staged: &StagedQuery,
) -> EtlResult<MergeSource> {
    let ctx = relations.ctx;
    let surrogate = auto_numbered_key(spec)?.map(|pk| pk.name.clone());
    let mut columns = Vec::with_capacity(spec.columns.len());

    for column in &spec.columns {
        let mut swap = None;
        let mut mapping = None;
        let kind = if !staged.has_column(&column.name) {
            ColumnKind::Missing
        } else if surrogate.as_ref() == Some(&column.name) {
            swap = Some(ctx.tables.pk_swap(&column.name));
            ColumnKind::SurrogateKey
        } else if let Some((_, reference)) = reference_swap(ctx, spec, staged, &column.name)? {
            if relations.exists(&reference).await? {
                swap = Some(reference);
            }
            ColumnKind::ForeignKey
        } else if spec.concept_columns.contains(&column.name) {
            let table = ctx.tables.usagi_mapping(&spec.name, &column.name);
            if relations.exists(&table).await? {
                mapping = Some(table);
                ColumnKind::MappedConcept
            } else {
                ColumnKind::Concept
            }
        } else {
            ColumnKind::Plain
        };

        columns.push(MergeColumn {
            name: column.name.to_string(),
            kind,
            data_type: ctx.warehouse.column_type(column.data_type),
            swap,
            mapping,
        });
    }

    Ok(MergeSource {
        query_file: staged.file.file_name(),
        work_table: staged.work_table.clone(),
        columns,
    })
}

/// Render the delete+insert script that merges every staged query into the
/// target table, in query file order
pub(crate) async fn render_merge(
    ctx: &EtlContext,
    spec: &TableSpec,
    staged: &[StagedQuery],
) -> EtlResult<String> {
    let mut relations = Relations {
        ctx,
        known: HashMap::new(),
    };
    let mut sources = Vec::with_capacity(staged.len());
    for query in staged {
        sources.push(plan_source(&mut relations, spec, query).await?);
    }

    let statement = MergeStatement {
        target: ctx.tables.omop(&spec.name),
        primary_key: spec.primary_key_column()?.map(|pk| pk.name.as_str()),
        columns: spec.columns.iter().map(|c| c.name.as_str()).collect(),
        sources,
    };
    Ok(ctx.renderer.render("table_merge", statement)?)
}

/// Merge every staged query in one transaction
pub(crate) async fn merge(
    ctx: &EtlContext,
    spec: &TableSpec,
    staged: &[StagedQuery],
) -> EtlResult<()> {
    if staged.is_empty() {
        log::info!("{}: no query files, nothing to merge", spec.name);
        return Ok(());
    }
    let sql = render_merge(ctx, spec, staged).await?;
    ctx.warehouse.execute_atomic(&sql).await?;
    log::info!(
        "{}: merged {} query files into {}",
        spec.name,
        staged.len(),
        ctx.tables.omop(&spec.name)
    );
    Ok(())
}
