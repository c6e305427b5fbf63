//! Cleanup command implementation

use anyhow::{Context, Result};
use cf_etl::CleanupScope;

use crate::cli::{CleanupArgs, GlobalArgs};
use crate::commands::common::plural;
use crate::context::RuntimeContext;

/// Execute the cleanup command
pub async fn execute(args: &CleanupArgs, global: &GlobalArgs) -> Result<()> {
    let scope: CleanupScope = args
        .scope
        .parse()
        .with_context(|| format!("Invalid cleanup scope '{}'", args.scope))?;
    let ctx = RuntimeContext::new(global)?;

    println!("Cleaning {}", scope);
    let summary = ctx
        .pipeline
        .cleanup(&scope)
        .await
        .with_context(|| format!("Cleanup of {} failed", scope))?;

    if global.verbose {
        for table in &summary.dropped_tables {
            println!("  Dropped: {}", table);
        }
        for table in &summary.emptied_tables {
            println!("  Emptied: {}", table);
        }
    }
    println!(
        "Dropped {}, emptied {}",
        plural(summary.dropped_tables.len(), "work table", "work tables"),
        plural(summary.emptied_tables.len(), "table", "tables")
    );
    Ok(())
}
