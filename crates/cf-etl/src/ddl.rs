//! Creation of the warehouse schemas and CDM tables

use crate::concepts::ensure_concept_id_swap;
use crate::context::EtlContext;
use crate::error::EtlResult;
use serde::Serialize;

#[derive(Serialize)]
struct SchemasContext<'a> {
    schemas: [&'a str; 3],
}

#[derive(Serialize)]
struct ColumnDdl {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    not_null: bool,
}

#[derive(Serialize)]
struct TableDdl {
    table: String,
    columns: Vec<ColumnDdl>,
}

/// Create the raw, work and omop schemas and every catalog table.
/// Returns the number of tables in the catalog.
pub(crate) async fn create_cdm_tables(ctx: &EtlContext) -> EtlResult<usize> {
    let sql = ctx.renderer.render(
        "create_schemas",
        SchemasContext {
            schemas: [
                ctx.tables.raw_schema(),
                ctx.tables.work_schema(),
                ctx.tables.omop_schema(),
            ],
        },
    )?;
    ctx.warehouse.execute_batch(&sql).await?;

    let mut script = String::new();
    let mut count = 0;
    for spec in ctx.catalog.tables() {
        let columns = spec
            .columns
            .iter()
            .map(|column| ColumnDdl {
                name: column.name.to_string(),
                data_type: ctx.warehouse.column_type(column.data_type),
                not_null: spec.is_not_null(column),
            })
            .collect();
        script.push_str(&ctx.renderer.render(
            "create_cdm_table",
            TableDdl {
                table: ctx.tables.omop(&spec.name),
                columns,
            },
        )?);
        script.push('\n');
        count += 1;
    }
    ctx.warehouse.execute_batch(&script).await?;
    ensure_concept_id_swap(ctx).await?;

    log::info!(
        "Created {} tables in schema {}",
        count,
        ctx.tables.omop_schema()
    );
    Ok(count)
}
