//! Stage-1 vision extraction worker (§4.2): loads each pending Item's
//! images, submits a vision request per Item through the shared
//! [`LlmExecutor`], parses the response, and runs Stage-1.5 cleaning before
//! committing both records to the store.

use std::sync::Arc;

use camino::Utf8Path;
use mediacat_llm::{BatchProvider, LlmBackend, LlmExecutor, LlmRequest, ModeHint, RequestOutcome};
use mediacat_store::{Item, ItemStatus, LlmCallInfo, WorkflowStore};
use tracing::warn;

use crate::image_loader::load_image;
use crate::prompts::build_stage1_messages;
use crate::stage1_parse;

pub struct Stage1Pipeline<B: LlmBackend, P: BatchProvider> {
    executor: Arc<LlmExecutor<B, P>>,
    model: String,
}

impl<B: LlmBackend, P: BatchProvider> Stage1Pipeline<B, P> {
    pub fn new(executor: Arc<LlmExecutor<B, P>>, model: impl Into<String>) -> Self {
        Self {
            executor,
            model: model.into(),
        }
    }

    fn build_request(&self, item: &Item) -> Result<LlmRequest, String> {
        let mut images = Vec::with_capacity(item.images.len());
        for image_ref in &item.images {
            let part = load_image(Utf8Path::new(&image_ref.path)).map_err(|e| e.to_string())?;
            images.push(part);
        }
        let messages = build_stage1_messages(images);
        Ok(LlmRequest::new(item.barcode.clone(), "stage1", self.model.clone(), messages))
    }

    /// Submits every `Created` Item and advances it through `Stage1Done` and
    /// `Stage15Done` on success, or `Failed` on an unrecoverable error.
    pub async fn run(&self, store: &WorkflowStore) {
        let pending = store.list_pending(ItemStatus::Created);
        if pending.is_empty() {
            return;
        }

        let mut requests = Vec::with_capacity(pending.len());
        for item in &pending {
            match self.build_request(item) {
                Ok(request) => requests.push(request),
                Err(detail) => {
                    if let Err(e) = store.update(&item.barcode, |it| {
                        it.status = ItemStatus::Failed;
                        it.failure_reason = Some(detail.clone());
                    }) {
                        warn!(barcode = %item.barcode, error = %e, "failed to record image load failure");
                    }
                }
            }
        }
        if requests.is_empty() {
            return;
        }

        let outcomes = self.executor.submit("stage1", requests, ModeHint::Auto, true, store).await;
        self.ingest(outcomes, store).await;
    }

    /// Applies Stage-1 outcomes (from either a fresh submission or a resumed
    /// batch job) to the store.
    pub(crate) async fn ingest(&self, outcomes: Vec<RequestOutcome>, store: &WorkflowStore) {
        for outcome in outcomes {
            match outcome {
                RequestOutcome::Ok(result) => {
                    let barcode = result.barcode.clone();
                    let mut stage1 = stage1_parse::parse(&result.raw_response);
                    stage1.call = LlmCallInfo {
                        provider: Some(result.provider.clone()),
                        model_used: Some(result.model_used.clone()),
                        tokens_input: result.tokens_input,
                        tokens_output: result.tokens_output,
                        cost_usd: result.cost_usd,
                        duration_ms: None,
                        batch: result.batch,
                    };

                    let stage1_record = stage1.clone();
                    if let Err(e) = store.update(&barcode, move |item| {
                        item.stage1 = Some(stage1_record);
                        item.status = ItemStatus::Stage1Done;
                    }) {
                        warn!(barcode, error = %e, "failed to commit stage1 record");
                        continue;
                    }

                    let stage15 = mediacat_verify::clean(&stage1);
                    if let Err(e) = store.update(&barcode, move |item| {
                        item.stage15 = Some(stage15);
                        item.status = ItemStatus::Stage15Done;
                    }) {
                        warn!(barcode, error = %e, "failed to commit stage1.5 record");
                    }
                }
                RequestOutcome::Failed { barcode, error } => {
                    if let Err(e) = store.update(&barcode, |item| {
                        item.status = ItemStatus::Failed;
                        item.failure_reason = Some(error.clone());
                    }) {
                        warn!(barcode, error = %e, "failed to record stage1 failure");
                    }
                }
            }
        }
    }
}
