//! One table's walk through the pipeline stages

use crate::concepts::{load_code_mappings, load_custom_concepts};
use crate::context::EtlContext;
use crate::error::{EtlError, EtlResult};
use crate::keys::{dangling_references, swap_keys};
use crate::merge::merge;
use crate::staging::{stage_queries, PlannedQuery};
use cf_core::{
    infer_event_references, DanglingReference, Stage, TableError, TableName, TableOutcome,
    TableSpec, TableState,
};
use chrono::NaiveDate;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;

pub(crate) struct TableRun {
    ctx: Arc<EtlContext>,
    table: TableName,
    tier: usize,
    skip_mappings: bool,
    run_date: NaiveDate,
    stage: Stage,
    dangling: Vec<DanglingReference>,
}

impl TableRun {
    pub fn new(
        ctx: Arc<EtlContext>,
        table: TableName,
        tier: usize,
        skip_mappings: bool,
        run_date: NaiveDate,
    ) -> Self {
        Self {
            ctx,
            table,
            tier,
            skip_mappings,
            run_date,
            stage: Stage::Start,
            dangling: Vec::new(),
        }
    }

    /// Run every stage and report how the table ended
    pub async fn execute(mut self) -> TableOutcome {
        let started = Instant::now();
        let result = self.run_stages().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (state, errors) = match result {
            Ok(()) => {
                log::info!("{}: done in {} ms", self.table, duration_ms);
                (TableState::Done, Vec::new())
            }
            Err(e) => {
                log::error!("{}: failed in {}: {}", self.table, self.stage, e);
                let error = TableError {
                    kind: e.kind(),
                    stage: self.stage,
                    message: e.to_string(),
                    path: e.path(),
                };
                (TableState::Failed, vec![error])
            }
        };

        TableOutcome {
            table: self.table,
            tier: self.tier,
            state,
            stage: self.stage,
            skip_reason: None,
            errors,
            dangling_references: self.dangling,
            duration_ms,
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("{}: {}", self.table, stage);
        self.stage = stage;
    }

    /// Await a stage, bounded by the configured stage timeout.
    /// Stage futures are boxed so the spawned table future stays `Send`.
    async fn timed<T>(&self, fut: BoxFuture<'_, EtlResult<T>>) -> EtlResult<T> {
        match self.ctx.options.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| EtlError::StageTimeout {
                    table: self.table.to_string(),
                    stage: self.stage,
                    limit,
                })?,
            None => fut.await,
        }
    }

    async fn run_stages(&mut self) -> EtlResult<()> {
        let ctx = Arc::clone(&self.ctx);
        let spec = ctx.catalog.table(&self.table)?;

        self.enter(Stage::Start);
        let planned = self.timed(Box::pin(self.validate(spec))).await?;

        self.enter(Stage::LoadConcepts);
        if !self.skip_mappings {
            self.timed(Box::pin(self.load_concepts(spec))).await?;
        }

        self.enter(Stage::LoadCodeMappings);
        if !self.skip_mappings {
            self.timed(Box::pin(self.load_mappings(spec))).await?;
        }

        self.enter(Stage::StageQuery);
        let staged = self
            .timed(Box::pin(stage_queries(&ctx, &self.table, &planned)))
            .await?;

        self.enter(Stage::SwapKeys);
        let dangling = self
            .timed(Box::pin(async {
                swap_keys(&ctx, spec, &staged).await?;
                dangling_references(&ctx, spec, &staged).await
            }))
            .await?;
        self.dangling = dangling;

        self.enter(Stage::Merge);
        self.timed(Box::pin(merge(&ctx, spec, &staged))).await?;

        self.enter(Stage::Done);
        Ok(())
    }

    /// Check the table against the catalog and the warehouse and plan its
    /// query files
    async fn validate(&self, spec: &TableSpec) -> EtlResult<Vec<PlannedQuery>> {
        let ctx = &self.ctx;
        spec.primary_key_column()?;

        let target = ctx.tables.omop(&spec.name);
        let existing = ctx.warehouse.read_columns(&target).await?;
        if existing.is_empty() {
            return Err(EtlError::schema(
                &spec.name,
                format!("{} does not exist in the warehouse", target),
            ));
        }
        for column in &spec.columns {
            if !existing.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                return Err(EtlError::schema(
                    &spec.name,
                    format!("column {} is missing from {}", column.name, target),
                ));
            }
        }

        let mut planned = Vec::new();
        for file in ctx.folder.query_files(&spec.name)? {
            let events = infer_event_references(&ctx.catalog, spec, &file)?;
            planned.push(PlannedQuery { file, events });
        }
        log::info!("{}: {} query files", spec.name, planned.len());
        Ok(planned)
    }

    async fn load_concepts(&self, spec: &TableSpec) -> EtlResult<()> {
        for column in self.ctx.folder.mapped_columns(spec) {
            load_custom_concepts(&self.ctx, &spec.name, &column).await?;
        }
        Ok(())
    }

    async fn load_mappings(&self, spec: &TableSpec) -> EtlResult<()> {
        for column in self.ctx.folder.mapped_columns(spec) {
            load_code_mappings(&self.ctx, &spec.name, &column, self.run_date).await?;
        }
        Ok(())
    }
}
