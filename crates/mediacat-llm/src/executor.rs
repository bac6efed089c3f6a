//! `LlmExecutor`: chooses between synchronous per-item calls and
//! provider-side asynchronous batch jobs, with adaptive sub-batching on
//! payload-size limits (§4.3, the hardest subsystem).

use async_trait::async_trait;
use mediacat_config::LlmConfig;
use mediacat_store::{BatchJobHandle, WorkflowStore};
use mediacat_utils::retry::{retry_with_policy, RetryPolicy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::backend::ClassifiedHttpError;
use crate::batching::{custom_id, partition_into_chunks};
use crate::ledger::CostLedger;
use crate::types::{LlmBackend, LlmError, LlmRequest, LlmResult, RequestOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeHint {
    Auto,
    ForceSync,
    ForceBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// Abstraction over a provider's asynchronous batch API (e.g. submit a
/// JSONL of typed requests, poll, download JSONL results keyed by
/// `custom_id`), so the adaptive sub-batching logic in this module is
/// testable without a live provider.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    async fn submit_batch(&self, requests: &[(String, LlmRequest)]) -> Result<String, LlmError>;
    async fn poll_status(&self, provider_id: &str) -> Result<BatchStatus, LlmError>;
    /// Returns `custom_id -> Ok(result) | Err(detail)` for every request in the batch.
    async fn fetch_results(&self, provider_id: &str) -> Result<HashMap<String, Result<LlmResult, String>>, LlmError>;
}

pub struct LlmExecutor<B: LlmBackend, P: BatchProvider> {
    backend: Arc<B>,
    batch_provider: Arc<P>,
    config: LlmConfig,
    retry_policy: RetryPolicy,
    ledger: Arc<CostLedger>,
    semaphore: Arc<Semaphore>,
}

impl<B: LlmBackend, P: BatchProvider> LlmExecutor<B, P> {
    pub fn new(backend: Arc<B>, batch_provider: Arc<P>, config: LlmConfig, ledger: Arc<CostLedger>) -> Self {
        let max_concurrent = config.max_concurrent_requests.max(1);
        Self {
            backend,
            batch_provider,
            retry_policy: RetryPolicy::default(),
            config,
            ledger,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.ledger.total_cost_usd()
    }

    fn should_use_batch(&self, request_count: usize, mode_hint: ModeHint, stage_batch_eligible: bool) -> bool {
        match mode_hint {
            ModeHint::ForceSync => false,
            ModeHint::ForceBatch => true,
            ModeHint::Auto => stage_batch_eligible && request_count >= self.config.batch_threshold,
        }
    }

    pub async fn submit(
        &self,
        stage_tag: &str,
        requests: Vec<LlmRequest>,
        mode_hint: ModeHint,
        stage_batch_eligible: bool,
        store: &WorkflowStore,
    ) -> Vec<RequestOutcome> {
        if self.should_use_batch(requests.len(), mode_hint, stage_batch_eligible) {
            self.submit_batch(stage_tag, requests, store).await
        } else {
            self.submit_sync(stage_tag, requests).await
        }
    }

    async fn submit_sync(&self, stage_tag: &str, requests: Vec<LlmRequest>) -> Vec<RequestOutcome> {
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let backend = self.backend.clone();
            let semaphore = self.semaphore.clone();
            let policy = self.retry_policy;
            let ledger = self.ledger.clone();
            let stage_tag = stage_tag.to_string();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let barcode = request.barcode.clone();
                let model = request.model.clone();
                let result = retry_with_policy(&policy, backend.provider_name(), |_attempt| {
                    let backend = &backend;
                    let request = &request;
                    async move { backend.invoke(request).await.map_err(ClassifiedHttpError) }
                })
                .await;

                match result {
                    Ok(mut llm_result) => {
                        let cost = ledger.record(
                            &barcode,
                            &stage_tag,
                            &llm_result.provider,
                            &model,
                            llm_result.tokens_input.unwrap_or(0),
                            llm_result.tokens_output.unwrap_or(0),
                            false,
                        );
                        llm_result.cost_usd = Some(cost);
                        RequestOutcome::Ok(llm_result)
                    }
                    Err(ClassifiedHttpError(e)) => RequestOutcome::Failed {
                        barcode,
                        error: e.to_string(),
                    },
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "sync LLM task panicked"),
            }
        }
        outcomes
    }

    async fn submit_batch(
        &self,
        stage_tag: &str,
        requests: Vec<LlmRequest>,
        store: &WorkflowStore,
    ) -> Vec<RequestOutcome> {
        let chunk_indices = partition_into_chunks(&requests, self.config.max_sub_batch_bytes);
        let chunked = chunk_indices.len() > 1;
        info!(stage_tag, chunk_count = chunk_indices.len(), "submitting adaptive batch");

        let mut all_outcomes = Vec::with_capacity(requests.len());
        let mut chunk_futures = Vec::new();

        for (chunk_i, indices) in chunk_indices.into_iter().enumerate() {
            let named: Vec<(String, LlmRequest)> = indices
                .into_iter()
                .enumerate()
                .map(|(local_idx, req_idx)| {
                    let request = requests[req_idx].clone();
                    let id = custom_id(stage_tag, local_idx, &request, chunked.then_some(chunk_i));
                    (id, request)
                })
                .collect();
            chunk_futures.push(self.run_one_chunk(stage_tag, named, store));
        }

        for future in chunk_futures {
            all_outcomes.extend(future.await);
        }
        all_outcomes
    }

    async fn run_one_chunk(
        &self,
        stage_tag: &str,
        named_requests: Vec<(String, LlmRequest)>,
        store: &WorkflowStore,
    ) -> Vec<RequestOutcome> {
        let custom_id_map: HashMap<String, String> = named_requests
            .iter()
            .map(|(id, req)| (id.clone(), req.barcode.clone()))
            .collect();

        let provider_id = match self.batch_provider.submit_batch(&named_requests).await {
            Ok(id) => id,
            Err(e) => {
                return named_requests
                    .into_iter()
                    .map(|(_, req)| RequestOutcome::Failed {
                        barcode: req.barcode,
                        error: e.to_string(),
                    })
                    .collect();
            }
        };

        if let Err(e) = store.register_batch_job(BatchJobHandle::new(&provider_id, stage_tag, custom_id_map.clone())) {
            warn!(error = %e, provider_id, "failed to register batch job before polling");
        }

        let outcomes = self.poll_and_fetch(stage_tag, &provider_id, &custom_id_map).await;
        if let Err(e) = store.close_batch_job(&provider_id) {
            warn!(error = %e, provider_id, "failed to close batch job registration");
        }
        outcomes
    }

    async fn poll_and_fetch(
        &self,
        stage_tag: &str,
        provider_id: &str,
        custom_id_map: &HashMap<String, String>,
    ) -> Vec<RequestOutcome> {
        let deadline = Instant::now() + Duration::from_secs(self.config.batch_hard_deadline_secs);
        let check_interval = Duration::from_secs(self.config.batch_check_interval_secs);

        loop {
            match self.batch_provider.poll_status(provider_id).await {
                Ok(BatchStatus::Completed) => break,
                Ok(BatchStatus::Failed) | Ok(BatchStatus::Cancelled) => {
                    return custom_id_map
                        .values()
                        .map(|barcode| RequestOutcome::Failed {
                            barcode: barcode.clone(),
                            error: format!("batch job {provider_id} was cancelled or failed"),
                        })
                        .collect();
                }
                Ok(BatchStatus::InProgress) => {
                    if Instant::now() >= deadline {
                        warn!(provider_id, "batch job exceeded hard deadline");
                        return custom_id_map
                            .values()
                            .map(|barcode| RequestOutcome::Failed {
                                barcode: barcode.clone(),
                                error: "batch job exceeded hard deadline".to_string(),
                            })
                            .collect();
                    }
                    tokio::time::sleep(check_interval).await;
                }
                Err(e) => {
                    warn!(provider_id, error = %e, "error polling batch status; retrying");
                    tokio::time::sleep(check_interval).await;
                }
            }
        }

        match self.batch_provider.fetch_results(provider_id).await {
            Ok(results) => custom_id_map
                .iter()
                .map(|(id, barcode)| match results.get(id) {
                    Some(Ok(result)) => {
                        // `fetch_results` has no barcode of its own; the
                        // custom_id -> barcode mapping only the executor holds
                        // is the only way back to the Item.
                        let mut result = result.clone();
                        result.barcode = barcode.clone();
                        let cost = self.ledger.record(
                            barcode.clone(),
                            stage_tag,
                            result.provider.clone(),
                            &result.model_used,
                            result.tokens_input.unwrap_or(0),
                            result.tokens_output.unwrap_or(0),
                            true,
                        );
                        result.cost_usd = Some(cost);
                        RequestOutcome::Ok(result)
                    }
                    Some(Err(detail)) => RequestOutcome::Failed {
                        barcode: barcode.clone(),
                        error: detail.clone(),
                    },
                    None => RequestOutcome::Failed {
                        barcode: barcode.clone(),
                        error: format!("no result returned for custom_id {id}"),
                    },
                })
                .collect(),
            Err(e) => custom_id_map
                .values()
                .map(|barcode| RequestOutcome::Failed {
                    barcode: barcode.clone(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }

    /// Rehydrates every provider batch job still registered in the store
    /// (§4.3 `resume_open_jobs`, §8 scenario 5: batch resume).
    pub async fn resume_open_jobs(&self, store: &WorkflowStore) -> Vec<(String, Vec<RequestOutcome>)> {
        let mut results = Vec::new();
        for job in store.list_open_batch_jobs() {
            info!(provider_id = %job.provider_id, stage = %job.stage, "resuming open batch job");
            let outcomes = self.poll_and_fetch(&job.stage, &job.provider_id, &job.custom_id_map).await;
            if let Err(e) = store.close_batch_job(&job.provider_id) {
                warn!(error = %e, provider_id = %job.provider_id, "failed to close resumed batch job");
            }
            results.push((job.stage, outcomes));
        }
        results
    }
}
