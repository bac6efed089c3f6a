//! `RunController` (§4.1, §9 "subprocess orchestration of per-folder
//! scripts -> in-process stage scheduler with durable, resumable state"):
//! sequences the six stages strictly in order, resuming any open provider
//! batch jobs before Stage 1 and Stage 3 run.

use std::sync::Arc;

use mediacat_llm::{BatchProvider, LlmBackend, LlmExecutor};
use mediacat_store::{ItemStatus, WorkflowStore};
use tokio::sync::watch;
use tracing::info;

use crate::stage1::Stage1Pipeline;
use crate::stage2::Stage2Pipeline;
use crate::stage3::Stage3Pipeline;
use crate::stage4::Stage4Pipeline;
use crate::stage5::Stage5Pipeline;

/// Per-Item disposition tally plus the failed barcodes and reasons, enough
/// for a CLI summary without re-walking the store.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub total_items: usize,
    pub completed: usize,
    pub failed: Vec<(String, String)>,
    pub total_cost_usd: f64,
}

/// Sequences Stage 1 through Stage 5 for one run. Stages execute strictly in
/// order (§4.1: "no Item enters stage N+1 until every Item has either
/// completed or permanently failed stage N"); within a stage, Items run
/// concurrently up to `worker_pool_size`.
pub struct RunController<B: LlmBackend, P: BatchProvider> {
    store: Arc<WorkflowStore>,
    executor: Arc<LlmExecutor<B, P>>,
    stage1: Stage1Pipeline<B, P>,
    stage2: Stage2Pipeline,
    stage3: Stage3Pipeline<B, P>,
    stage4: Stage4Pipeline,
    stage5: Stage5Pipeline,
}

impl<B: LlmBackend, P: BatchProvider> RunController<B, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<WorkflowStore>,
        executor: Arc<LlmExecutor<B, P>>,
        stage1: Stage1Pipeline<B, P>,
        stage2: Stage2Pipeline,
        stage3: Stage3Pipeline<B, P>,
        stage4: Stage4Pipeline,
        stage5: Stage5Pipeline,
    ) -> Self {
        Self {
            store,
            executor,
            stage1,
            stage2,
            stage3,
            stage4,
            stage5,
        }
    }

    /// Runs every stage to completion, or until `cancel` reports `true`
    /// between stages. Cancellation drains the in-flight stage (each
    /// stage's `run` already awaits its own work to completion) and returns
    /// without starting the next one, leaving the store in a valid
    /// resumable state.
    pub async fn run(&self, cancel: Option<watch::Receiver<bool>>) -> RunReport {
        let is_cancelled = |cancel: &Option<watch::Receiver<bool>>| cancel.as_ref().is_some_and(|rx| *rx.borrow());

        info!("resuming any open batch jobs before stage 1/3");
        for (stage_tag, outcomes) in self.executor.resume_open_jobs(&self.store).await {
            match stage_tag.as_str() {
                "stage1" => self.stage1.ingest(outcomes, &self.store).await,
                "stage3" => self.stage3.ingest(outcomes, &self.store).await,
                other => tracing::warn!(stage = other, "resumed batch job for unrecognized stage tag"),
            }
        }

        if !is_cancelled(&cancel) {
            info!("stage 1: vision extraction");
            self.stage1.run(&self.store).await;
        }
        if !is_cancelled(&cancel) {
            info!("stage 2: catalog search");
            self.stage2.run(&self.store).await;
        }
        if !is_cancelled(&cancel) {
            info!("stage 3: candidate selection");
            self.stage3.run(&self.store).await;
        }
        if !is_cancelled(&cancel) {
            info!("stage 4: verification");
            self.stage4.run(&self.store);
        }
        if !is_cancelled(&cancel) {
            info!("stage 5: disposition");
            self.stage5.run(&self.store).await;
        }

        self.build_report()
    }

    fn build_report(&self) -> RunReport {
        let items = self.store.all_items();
        let failed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .map(|i| (i.barcode.clone(), i.failure_reason.clone().unwrap_or_default()))
            .collect();
        let completed = items.iter().filter(|i| i.status == ItemStatus::Stage5Done).count();

        RunReport {
            total_items: items.len(),
            completed,
            failed,
            total_cost_usd: self.executor.total_cost_usd(),
        }
    }
}
