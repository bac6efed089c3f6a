use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A provider-side batch job registered before upload completes, so a
/// crashed or cancelled run can reclaim it on restart (§4.1, §4.3 "batch
/// resume", §8 scenario 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobHandle {
    pub provider_id: String,
    pub stage: String,
    /// Maps each request's `custom_id` back to the barcode it belongs to.
    pub custom_id_map: HashMap<String, String>,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub closed: bool,
}

impl BatchJobHandle {
    pub fn new(
        provider_id: impl Into<String>,
        stage: impl Into<String>,
        custom_id_map: HashMap<String, String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            stage: stage.into(),
            custom_id_map,
            registered_at: chrono::Utc::now(),
            closed: false,
        }
    }
}
