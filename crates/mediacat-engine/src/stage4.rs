//! Stage-4 verification worker (§4.9): a pure computation over already
//! committed Stage-1/2/3 records, so it runs synchronously with no I/O and
//! no concurrency of its own.

use mediacat_config::Thresholds;
use mediacat_store::{ItemStatus, Stage4Record, WorkflowStore};
use tracing::warn;

pub struct Stage4Pipeline {
    thresholds: Thresholds,
}

impl Stage4Pipeline {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Confidence monotonicity (§8: `stage4.final_confidence <=
    /// stage3.initial_confidence`) holds by construction in
    /// `mediacat_verify::verify`, which only ever lowers confidence to
    /// `review_threshold`, never raises it.
    pub fn run(&self, store: &WorkflowStore) {
        for item in store.list_pending(ItemStatus::Stage3Done) {
            let stage1 = item.stage1.clone().unwrap_or_default();
            let stage2 = item.stage2.clone().unwrap_or_default();
            let stage3 = item.stage3.clone().unwrap_or_default();

            let candidate = stage2.candidates.iter().find(|c| c.oclc_number == stage3.selected_oclc);
            let record = match candidate {
                Some(candidate) if mediacat_verify::should_verify(stage3.initial_confidence, &self.thresholds) => {
                    mediacat_verify::verify(&stage1, candidate, &stage3, &self.thresholds)
                }
                _ => Stage4Record {
                    track_similarity_percentage: 0.0,
                    year_match: None,
                    adjustment: Default::default(),
                    final_confidence: stage3.initial_confidence,
                },
            };

            if let Err(e) = store.update(&item.barcode, move |item| {
                item.stage4 = Some(record);
                item.status = ItemStatus::Stage4Done;
            }) {
                warn!(barcode = %item.barcode, error = %e, "failed to commit stage4 record");
            }
        }
    }
}
