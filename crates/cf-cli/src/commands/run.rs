//! Run command implementation
//!
//! Ctrl-C cancels the run: tables already started finish, nothing new
//! starts, and the report is still written.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cli::{GlobalArgs, OutputFormat, RunArgs};
use crate::commands::common::{format_report, plural, ExitCode};
use crate::context::RuntimeContext;

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = RuntimeContext::new(global)?;
    let table = ctx.table_arg(args.table.as_deref())?;
    let json_mode = args.output == OutputFormat::Json;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, waiting for running tables to finish");
            on_signal.cancel();
        }
    });

    if !json_mode {
        let tiers = ctx.pipeline.tiers(table.as_ref())?;
        println!(
            "Running {} in {}\n",
            plural(tiers.iter().map(|t| t.len()).sum(), "table", "tables"),
            plural(tiers.len(), "tier", "tiers")
        );
    }

    let report = ctx
        .pipeline
        .run_with_cancellation(table.as_ref(), args.skip_mappings, cancel)
        .await;
    signal_task.abort();
    let report = report.context("Run failed")?;

    let report_path = ctx.report_path();
    report
        .save(&report_path)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    if json_mode {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report(&report));
        println!("Report written to {}", report_path.display());
    }

    match report.exit_code() {
        0 => Ok(()),
        code => Err(ExitCode(code).into()),
    }
}
