//! Error taxonomy and wire-adjacent types for the OCLC WorldCat clients
//! (§4.4 `CatalogSearchClient`, §4.5 `HoldingsClient`).

use mediacat_utils::retry::Retryable;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("transport error calling {endpoint}: {detail}")]
    Transport { endpoint: String, detail: String },

    #[error("request to {endpoint} timed out after {duration:?}")]
    Timeout { endpoint: String, duration: Duration },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    ProviderHttp {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("OCLC rate limit exceeded calling {endpoint}")]
    Quota {
        endpoint: String,
        retry_after_secs: Option<u64>,
    },

    #[error("daily OCLC request quota exhausted")]
    DailyQuotaExceeded,

    #[error("failed to parse response from {endpoint}: {detail}")]
    Parse { endpoint: String, detail: String },

    #[error("failed to obtain an OAuth2 access token: {detail}")]
    Auth { detail: String },
}

/// Transient network/5xx/429 are retried; auth/parse/4xx failures are not,
/// except 401, which is retried once so the refreshed token from
/// `TokenCache::refresh` (§4.4 "authentication token is cached and
/// refreshed on 401") gets a second attempt.
pub struct ClassifiedCatalogError(pub CatalogError);

impl Retryable for ClassifiedCatalogError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.0,
            CatalogError::Transport { .. } | CatalogError::Timeout { .. } | CatalogError::Quota { .. }
        ) || matches!(&self.0, CatalogError::ProviderHttp { status, .. } if *status >= 500 || *status == 401)
    }

    fn is_quota(&self) -> bool {
        matches!(self.0, CatalogError::Quota { .. })
    }

    fn retry_after_hint(&self) -> Option<Duration> {
        match &self.0 {
            CatalogError::Quota {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClassifiedCatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
