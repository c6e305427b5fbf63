//! Tiers command implementation

use anyhow::Result;
use cf_core::render_tiers;

use crate::cli::{GlobalArgs, TiersArgs};
use crate::context::RuntimeContext;

/// Execute the tiers command
pub async fn execute(args: &TiersArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let table = ctx.table_arg(args.table.as_deref())?;
    let tiers = ctx.pipeline.tiers(table.as_ref())?;
    print!("{}", render_tiers(&tiers));
    Ok(())
}
