//! Pipeline driver
//!
//! Tables run tier by tier. Tables of one tier run concurrently, bounded by
//! `max_parallel_tables`; a tier starts only after the previous one ended
//! and not at all when a table of an earlier tier failed.

use crate::cleanup::{cleanup, CleanupScope, CleanupSummary};
use crate::concepts::{ensure_concept_id_swap, invalidate_stale_mappings};
use crate::context::{EtlContext, PipelineOptions};
use crate::ddl::create_cdm_tables;
use crate::error::{EtlError, EtlResult};
use crate::table_run::TableRun;
use crate::vocabulary::{import_vocabulary_snapshot, VocabularyImport};
use cf_core::{
    resolve, CoreError, ErrorKind, ExecutionTier, RunReport, SchemaCatalog, SkipReason, Stage,
    TableError, TableName, TableOutcome, TableState,
};
use cf_db::{ObjectStore, TabularReader, Warehouse};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// The ETL engine for one warehouse
pub struct Pipeline {
    ctx: Arc<EtlContext>,
}

impl Pipeline {
    pub fn new(
        catalog: SchemaCatalog,
        warehouse: Arc<dyn Warehouse>,
        object_store: Arc<dyn ObjectStore>,
        reader: Arc<dyn TabularReader>,
        options: PipelineOptions,
    ) -> EtlResult<Self> {
        let ctx = EtlContext::new(catalog, warehouse, object_store, reader, options)?;
        Ok(Self { ctx: Arc::new(ctx) })
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.ctx.catalog
    }

    /// Execution tiers of every ETL table, or the single tier of `only_table`
    pub fn tiers(&self, only_table: Option<&TableName>) -> EtlResult<Vec<ExecutionTier>> {
        let tables = self.ctx.catalog.etl_tables();
        let tiers = resolve(&self.ctx.catalog, &tables)?;
        match only_table {
            None => Ok(tiers),
            Some(table) if tables.contains(table) => {
                Ok(vec![ExecutionTier::new(vec![table.clone()])])
            }
            Some(table) => Err(CoreError::UnknownTable {
                name: table.to_string(),
            }
            .into()),
        }
    }

    /// Create the schemas and every catalog table
    pub async fn create_cdm_tables(&self) -> EtlResult<usize> {
        create_cdm_tables(&self.ctx).await
    }

    /// Run the ETL for every table, or for `only_table`
    pub async fn run(
        &self,
        only_table: Option<&TableName>,
        skip_mapping_upload: bool,
    ) -> EtlResult<RunReport> {
        self.run_with_cancellation(only_table, skip_mapping_upload, CancellationToken::new())
            .await
    }

    /// Run the ETL, starting no new table once `cancel` fires
    pub async fn run_with_cancellation(
        &self,
        only_table: Option<&TableName>,
        skip_mapping_upload: bool,
        cancel: CancellationToken,
    ) -> EtlResult<RunReport> {
        let tiers = self.tiers(only_table)?;
        let mut report = RunReport::start(&tiers, only_table.cloned(), skip_mapping_upload);
        let run_date = report.run_date();
        log::info!(
            "Run {}: {} tables in {} tiers",
            report.run_id,
            tiers.iter().map(ExecutionTier::len).sum::<usize>(),
            tiers.len()
        );

        ensure_concept_id_swap(&self.ctx).await?;

        let mut upstream_failed = false;
        for (index, tier) in tiers.iter().enumerate() {
            if upstream_failed || cancel.is_cancelled() {
                let reason = if upstream_failed {
                    SkipReason::UpstreamTierFailed
                } else {
                    SkipReason::Cancelled
                };
                for table in tier.tables() {
                    report.record(TableOutcome::skipped(table.clone(), index, reason));
                }
                continue;
            }

            log::info!("Tier {}: {}", index + 1, tier.len());
            for outcome in self
                .run_tier(index, tier, skip_mapping_upload, run_date, &cancel)
                .await
            {
                upstream_failed |= outcome.state == TableState::Failed;
                report.record(outcome);
            }
        }

        report.cancelled = cancel.is_cancelled();
        if only_table.is_none() && !skip_mapping_upload && !report.cancelled {
            match invalidate_stale_mappings(&self.ctx, run_date).await {
                Ok(count) => report.stale_mappings_invalidated = Some(count),
                Err(e) => {
                    log::error!("Invalidating stale mappings failed: {}", e);
                    report.run_errors.push(e.to_string());
                }
            }
        }

        report.finish();
        Ok(report)
    }

    async fn run_tier(
        &self,
        index: usize,
        tier: &ExecutionTier,
        skip_mappings: bool,
        run_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Vec<TableOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.ctx.options.max_parallel_tables.max(1)));
        let mut handles = Vec::with_capacity(tier.len());

        for table in tier.tables() {
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let table = table.clone();
            let name = table.clone();
            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return TableOutcome::skipped(table, index, SkipReason::Cancelled);
                };
                if cancel.is_cancelled() {
                    return TableOutcome::skipped(table, index, SkipReason::Cancelled);
                }
                TableRun::new(ctx, table, index, skip_mappings, run_date)
                    .execute()
                    .await
            });
            handles.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (table, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => task_failure(table, index, EtlError::Task(e.to_string())),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Mark mappings not refreshed on `run_date` as deleted
    pub async fn invalidate_stale_mappings(&self, run_date: NaiveDate) -> EtlResult<usize> {
        invalidate_stale_mappings(&self.ctx, run_date).await
    }

    /// Remove ETL output for `scope`
    pub async fn cleanup(&self, scope: &CleanupScope) -> EtlResult<CleanupSummary> {
        cleanup(&self.ctx, scope).await
    }

    /// Replace the vocabulary tables with an Athena snapshot
    pub async fn import_vocabulary_snapshot(
        &self,
        archive: &Path,
        on_table: impl FnMut(&TableName),
    ) -> EtlResult<VocabularyImport> {
        import_vocabulary_snapshot(&self.ctx, archive, on_table).await
    }
}

fn task_failure(table: TableName, tier: usize, error: EtlError) -> TableOutcome {
    TableOutcome {
        table,
        tier,
        state: TableState::Failed,
        stage: Stage::Failed,
        skip_reason: None,
        errors: vec![TableError {
            kind: ErrorKind::ExecutorError,
            stage: Stage::Failed,
            message: error.to_string(),
            path: None,
        }],
        dangling_references: Vec::new(),
        duration_ms: 0,
    }
}
