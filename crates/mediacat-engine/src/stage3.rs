//! Stage-3 candidate selection worker (§4.8): asks the selection model to
//! choose among the Stage-2 candidates and parses its answer into a
//! structured [`mediacat_store::Stage3Record`].

use std::sync::Arc;

use mediacat_llm::{BatchProvider, LlmBackend, LlmExecutor, LlmRequest, ModeHint, RequestOutcome};
use mediacat_store::{Item, ItemStatus, LlmCallInfo, WorkflowStore};
use tracing::warn;

use crate::prompts::build_stage3_messages;

pub struct Stage3Pipeline<B: LlmBackend, P: BatchProvider> {
    executor: Arc<LlmExecutor<B, P>>,
    model: String,
}

impl<B: LlmBackend, P: BatchProvider> Stage3Pipeline<B, P> {
    pub fn new(executor: Arc<LlmExecutor<B, P>>, model: impl Into<String>) -> Self {
        Self {
            executor,
            model: model.into(),
        }
    }

    fn build_request(&self, item: &Item) -> LlmRequest {
        let stage1 = item.stage1.clone().unwrap_or_default();
        let stage2 = item.stage2.clone().unwrap_or_default();
        let messages = build_stage3_messages(
            stage1.title.as_deref(),
            stage1.primary_contributor.as_deref(),
            stage1.publication_date.as_deref(),
            &stage2.candidates,
        );
        LlmRequest::new(item.barcode.clone(), "stage3", self.model.clone(), messages)
    }

    pub async fn run(&self, store: &WorkflowStore) {
        let pending = store.list_pending(ItemStatus::Stage2Done);
        if pending.is_empty() {
            return;
        }

        let requests: Vec<LlmRequest> = pending.iter().map(|item| self.build_request(item)).collect();
        let outcomes = self.executor.submit("stage3", requests, ModeHint::Auto, true, store).await;
        self.ingest(outcomes, store).await;
    }

    pub(crate) async fn ingest(&self, outcomes: Vec<RequestOutcome>, store: &WorkflowStore) {
        for outcome in outcomes {
            match outcome {
                RequestOutcome::Ok(result) => {
                    let barcode = result.barcode.clone();
                    let Some(item) = store.get(&barcode) else {
                        warn!(barcode, "stage3 result for unknown barcode");
                        continue;
                    };
                    let candidates = item.stage2.map(|s| s.candidates).unwrap_or_default();
                    let call = LlmCallInfo {
                        provider: Some(result.provider.clone()),
                        model_used: Some(result.model_used.clone()),
                        tokens_input: result.tokens_input,
                        tokens_output: result.tokens_output,
                        cost_usd: result.cost_usd,
                        duration_ms: None,
                        batch: result.batch,
                    };
                    let record = mediacat_selection::parse(&result.raw_response, &candidates, call);
                    if let Err(e) = store.update(&barcode, move |item| {
                        item.stage3 = Some(record);
                        item.status = ItemStatus::Stage3Done;
                    }) {
                        warn!(barcode, error = %e, "failed to commit stage3 record");
                    }
                }
                RequestOutcome::Failed { barcode, error } => {
                    if let Err(e) = store.update(&barcode, |item| {
                        item.status = ItemStatus::Failed;
                        item.failure_reason = Some(error.clone());
                    }) {
                        warn!(barcode, error = %e, "failed to record stage3 failure");
                    }
                }
            }
        }
    }
}
