//! Stage-5 disposition worker (§4.10, §9 Open Question "Alma verification
//! policy scope"): checks Alma holdings for every Item reaching Stage 4 —
//! not only the high-confidence ones — because `DispositionInput` needs
//! `held_by_institution` to assign the right group regardless of
//! confidence tier, and a low-confidence item still needs a complete
//! Stage5Record for the cataloger-review queue (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;

use mediacat_alma::AlmaClient;
use mediacat_config::Thresholds;
use mediacat_disposition::{assign_dispositions, DispositionInput};
use mediacat_store::{ItemStatus, WorkflowStore};
use tokio::sync::Semaphore;
use tracing::warn;

pub struct Stage5Pipeline {
    alma: Arc<AlmaClient>,
    thresholds: Thresholds,
    worker_pool_size: usize,
}

impl Stage5Pipeline {
    pub fn new(alma: Arc<AlmaClient>, thresholds: Thresholds, worker_pool_size: usize) -> Self {
        Self {
            alma,
            thresholds,
            worker_pool_size,
        }
    }

    pub async fn run(&self, store: &WorkflowStore) {
        let pending = store.list_pending(ItemStatus::Stage4Done);
        if pending.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.worker_pool_size.max(1)));
        let mut handles = Vec::with_capacity(pending.len());

        for item in &pending {
            let alma = self.alma.clone();
            let semaphore = semaphore.clone();
            let barcode = item.barcode.clone();
            let selected_oclc = item.stage3.clone().unwrap_or_default().selected_oclc;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if selected_oclc.is_empty() || selected_oclc == "0" {
                    return (barcode, false);
                }
                match alma.verify(&selected_oclc).await {
                    Ok((held, _mms_id)) => (barcode, held),
                    Err(e) => {
                        warn!(barcode, error = %e, "alma verification failed, treating as not held");
                        (barcode, false)
                    }
                }
            }));
        }

        let mut held_map: HashMap<String, bool> = HashMap::with_capacity(pending.len());
        for handle in handles {
            match handle.await {
                Ok((barcode, held)) => {
                    held_map.insert(barcode, held);
                }
                Err(e) => warn!(error = %e, "stage5 alma verification task panicked"),
            }
        }

        let inputs: Vec<DispositionInput> = pending
            .iter()
            .map(|item| {
                let stage1 = item.stage1.clone().unwrap_or_default();
                let stage2 = item.stage2.clone().unwrap_or_default();
                let stage3 = item.stage3.clone().unwrap_or_default();
                let stage4 = item.stage4.clone().unwrap_or_default();
                let candidate = stage2.candidates.iter().find(|c| c.oclc_number == stage3.selected_oclc).cloned();

                DispositionInput {
                    barcode: item.barcode.clone(),
                    oclc_number: stage3.selected_oclc,
                    confidence: stage4.final_confidence,
                    held_by_institution: held_map.get(&item.barcode).copied().unwrap_or(false),
                    authoritative_title: candidate.as_ref().map(|c| c.title.clone()).or(stage1.title),
                    authoritative_author: candidate
                        .as_ref()
                        .and_then(|c| c.contributors.first().cloned())
                        .or(stage1.primary_contributor),
                    authoritative_date: candidate.as_ref().and_then(|c| c.date.clone()).or(stage1.publication_date),
                }
            })
            .collect();

        let dispositions = assign_dispositions(&inputs, &self.thresholds);
        for (barcode, record) in dispositions {
            if let Err(e) = store.update(&barcode, move |item| {
                item.stage5 = Some(record);
                item.status = ItemStatus::Stage5Done;
            }) {
                warn!(barcode, error = %e, "failed to commit stage5 record");
            }
        }
    }
}
