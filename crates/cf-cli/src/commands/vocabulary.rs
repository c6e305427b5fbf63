//! Import-vocabulary command implementation

use anyhow::{Context, Result};
use cf_etl::VOCABULARY_SNAPSHOT_TABLES;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::cli::{GlobalArgs, ImportVocabularyArgs};
use crate::context::RuntimeContext;

/// Execute the import-vocabulary command
pub async fn execute(args: &ImportVocabularyArgs, global: &GlobalArgs) -> Result<()> {
    let archive = Path::new(&args.archive);
    if !archive.is_file() {
        anyhow::bail!("Vocabulary archive not found: {}", archive.display());
    }
    let ctx = RuntimeContext::new(global)?;

    let pb = ProgressBar::new(VOCABULARY_SNAPSHOT_TABLES.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut started = 0;
    let result = ctx
        .pipeline
        .import_vocabulary_snapshot(archive, |table| {
            if started > 0 {
                pb.inc(1);
            }
            started += 1;
            pb.set_message(table.to_string());
        })
        .await;
    pb.finish_and_clear();
    let import = result.with_context(|| format!("Failed to import {}", archive.display()))?;

    for (table, rows) in &import.loaded {
        println!("  {}: {} rows", table, rows);
    }
    for table in &import.skipped {
        println!("  {}: not in archive, unchanged", table);
    }
    println!(
        "Imported {} of {} vocabulary tables",
        import.loaded.len(),
        VOCABULARY_SNAPSHOT_TABLES.len()
    );
    Ok(())
}
