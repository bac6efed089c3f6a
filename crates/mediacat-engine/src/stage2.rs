//! Stage-2 catalog search worker (§4.4, §4.7): builds the priority-ordered
//! query list for each pending Item and searches WorldCat, attaching
//! holdings to every returned candidate.

use std::sync::Arc;

use mediacat_catalog::CatalogSearchClient;
use mediacat_query::{build_queries, MediaProfile};
use mediacat_store::{ItemStatus, Stage2Record, WorkflowStore};
use tokio::sync::Semaphore;
use tracing::warn;

pub struct Stage2Pipeline {
    search: Arc<CatalogSearchClient>,
    limit: u32,
    worker_pool_size: usize,
}

impl Stage2Pipeline {
    pub fn new(search: Arc<CatalogSearchClient>, limit: u32, worker_pool_size: usize) -> Self {
        Self {
            search,
            limit,
            worker_pool_size,
        }
    }

    pub async fn run(&self, store: &WorkflowStore) {
        let pending = store.list_pending(ItemStatus::Stage15Done);
        if pending.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size.max(1)));
        let mut handles = Vec::with_capacity(pending.len());

        for item in pending {
            let search = self.search.clone();
            let semaphore = semaphore.clone();
            let limit = self.limit;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let profile = MediaProfile::for_media_kind(item.media_kind);
                let stage1 = item.stage1.clone().unwrap_or_default();
                let stage15 = item.stage15.clone().unwrap_or_default();
                let queries = build_queries(&profile, &stage1, &stage15);
                let result = search.search(&queries, profile.item_type, profile.sub_type, limit).await;
                (item.barcode, queries, result)
            }));
        }

        for handle in handles {
            let (barcode, queries, result) = match handle.await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "stage2 search task panicked");
                    continue;
                }
            };

            match result {
                Ok((candidates, query_log)) => {
                    let record = Stage2Record {
                        queries_attempted: queries,
                        query_log,
                        candidates,
                    };
                    if let Err(e) = store.update(&barcode, move |item| {
                        item.stage2 = Some(record);
                        item.status = ItemStatus::Stage2Done;
                    }) {
                        warn!(barcode, error = %e, "failed to commit stage2 record");
                    }
                }
                Err(e) => {
                    let detail = e.to_string();
                    if let Err(e) = store.update(&barcode, move |item| {
                        item.status = ItemStatus::Failed;
                        item.failure_reason = Some(detail.clone());
                    }) {
                        warn!(barcode, error = %e, "failed to record stage2 failure");
                    }
                }
            }
        }
    }
}
