//! Error taxonomy and wire XML shapes for the Alma institutional catalog
//! API (§4.6, §6: "XML API with API-key header; search by
//! `other_system_id`, response includes `total_record_count` and
//! `bib/mms_id`").

use mediacat_utils::retry::Retryable;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AlmaError {
    #[error("transport error calling Alma: {detail}")]
    Transport { detail: String },

    #[error("Alma request timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Alma returned HTTP {status}: {body}")]
    ProviderHttp { status: u16, body: String },

    #[error("Alma rate limit exceeded")]
    Quota { retry_after_secs: Option<u64> },

    #[error("failed to parse Alma XML response: {detail}")]
    Parse { detail: String },

    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
}

pub struct ClassifiedAlmaError(pub AlmaError);

impl Retryable for ClassifiedAlmaError {
    fn is_retryable(&self) -> bool {
        matches!(self.0, AlmaError::Transport { .. } | AlmaError::Timeout { .. } | AlmaError::Quota { .. })
            || matches!(&self.0, AlmaError::ProviderHttp { status, .. } if *status >= 500)
    }

    fn is_quota(&self) -> bool {
        matches!(self.0, AlmaError::Quota { .. })
    }

    fn retry_after_hint(&self) -> Option<Duration> {
        match &self.0 {
            AlmaError::Quota {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClassifiedAlmaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BibsResponse {
    #[serde(default)]
    pub total_record_count: u32,
    #[serde(default, rename = "bib")]
    pub bibs: Vec<Bib>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Bib {
    #[serde(default)]
    pub mms_id: Option<String>,
}
