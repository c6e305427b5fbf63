//! Create-db command implementation

use anyhow::{Context, Result};

use crate::cli::GlobalArgs;
use crate::context::RuntimeContext;

/// Execute the create-db command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let count = ctx
        .pipeline
        .create_cdm_tables()
        .await
        .context("Failed to create the CDM tables")?;

    println!(
        "Created {} tables (catalog {}) in schema {}",
        count,
        ctx.pipeline.catalog().version(),
        ctx.config.schemas.omop
    );
    Ok(())
}
