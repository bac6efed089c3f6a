//! Error taxonomy for mediacat.
//!
//! The taxonomy is organized around *kinds*, not source types: every error
//! that can surface from a stage worker, remote client, or the store maps
//! onto one of six kinds, matching the propagation policy:
//!
//! - `TransientRemote` / `QuotaExceeded` / `ProviderBatchFailure` are
//!   per-request and never abort the run.
//! - `ParseError` is per-Item and halts only that Item's progress past the
//!   offending stage.
//! - `DataInvariantViolation` and `PersistenceError` are fatal: the
//!   `RunController` aborts the run after persisting what it can.

use std::time::Duration;

/// Category used for grouping errors in logs and user-facing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    RateLimit,
    BatchProvider,
    Parsing,
    Invariant,
    Persistence,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimit => "rate-limit",
            Self::BatchProvider => "batch-provider",
            Self::Parsing => "parsing",
            Self::Invariant => "invariant",
            Self::Persistence => "persistence",
        };
        write!(f, "{s}")
    }
}

/// Rich, user-facing error reporting, independent of `Display`.
///
/// `Display`/`Error` answer "what happened"; this answers "what should the
/// operator do about it". Every error surfaced to the error log or CLI goes
/// through this trait so the report is actionable rather than a bare
/// `{:?}`.
pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn context(&self) -> Option<String> {
        None
    }
    fn suggestions(&self) -> Vec<String> {
        Vec::new()
    }
    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, thiserror::Error)]
pub enum MediaCatError {
    #[error("transient remote failure calling {service} after {attempts} attempt(s): {detail}")]
    TransientRemote {
        service: String,
        attempts: u32,
        detail: String,
    },

    #[error("{scope} quota exceeded ({limit_kind})")]
    QuotaExceeded {
        scope: String,
        limit_kind: String,
        retry_after: Option<Duration>,
    },

    #[error("batch job {provider_id} failed or was cancelled: {detail}")]
    ProviderBatchFailure {
        provider_id: String,
        detail: String,
        failed_custom_ids: Vec<String>,
    },

    #[error("failed to parse {what} for barcode {barcode}: {detail}")]
    ParseError {
        what: String,
        barcode: String,
        detail: String,
    },

    #[error("data invariant violated: {detail}")]
    DataInvariantViolation { detail: String },

    #[error("persistence failure at {path}: {source}")]
    PersistenceError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    AtomicWrite(#[from] crate::atomic_write::AtomicWriteError),
}

impl UserFriendlyError for MediaCatError {
    fn user_message(&self) -> String {
        match self {
            Self::TransientRemote { service, .. } => {
                format!("Calls to {service} kept failing after retrying with backoff.")
            }
            Self::QuotaExceeded { scope, .. } => {
                format!("The {scope} rate or quota limit was hit.")
            }
            Self::ProviderBatchFailure { provider_id, .. } => {
                format!("Batch job {provider_id} did not complete successfully.")
            }
            Self::ParseError { what, barcode, .. } => {
                format!("Could not parse {what} for item {barcode}.")
            }
            Self::DataInvariantViolation { .. } => {
                "An internal consistency check failed; the run cannot continue safely.".to_string()
            }
            Self::PersistenceError { path, .. } => {
                format!("Failed to persist workflow state to {path}.")
            }
            Self::AtomicWrite(_) => "Failed to atomically write a state file.".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::TransientRemote {
                attempts, detail, ..
            } => Some(format!("{attempts} attempt(s) made; last error: {detail}")),
            Self::ProviderBatchFailure {
                failed_custom_ids, ..
            } if !failed_custom_ids.is_empty() => Some(format!(
                "{} request(s) in the batch failed: {}",
                failed_custom_ids.len(),
                failed_custom_ids.join(", ")
            )),
            Self::ParseError { detail, .. } => Some(detail.clone()),
            Self::DataInvariantViolation { detail } => Some(detail.clone()),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::TransientRemote { .. } => vec![
                "Check network connectivity and the remote service's status page.".to_string(),
                "Re-run the pipeline; it will resume from the last committed stage.".to_string(),
            ],
            Self::QuotaExceeded { .. } => vec![
                "Wait for the quota window to reset, or raise the configured limit.".to_string(),
            ],
            Self::ProviderBatchFailure { .. } => vec![
                "Inspect the batch provider's dashboard for the failed custom_ids.".to_string(),
            ],
            Self::ParseError { .. } => vec![
                "Inspect the raw LLM response logged under logs/ for this barcode.".to_string(),
            ],
            Self::DataInvariantViolation { .. } => {
                vec!["This indicates a bug; file an issue with the run directory attached.".to_string()]
            }
            Self::PersistenceError { .. } => vec![
                "Check disk space and filesystem permissions for the run directory.".to_string(),
            ],
            Self::AtomicWrite(_) => vec!["Check disk space and filesystem permissions.".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientRemote { .. } => ErrorCategory::Network,
            Self::QuotaExceeded { .. } => ErrorCategory::RateLimit,
            Self::ProviderBatchFailure { .. } => ErrorCategory::BatchProvider,
            Self::ParseError { .. } => ErrorCategory::Parsing,
            Self::DataInvariantViolation { .. } => ErrorCategory::Invariant,
            Self::PersistenceError { .. } | Self::AtomicWrite(_) => ErrorCategory::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaCatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_remote_reports_network_category() {
        let err = MediaCatError::TransientRemote {
            service: "oclc-search".to_string(),
            attempts: 3,
            detail: "connection reset".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.user_message().contains("oclc-search"));
        assert!(err.context().unwrap().contains("3 attempt"));
    }

    #[test]
    fn data_invariant_has_no_suggestion_retry() {
        let err = MediaCatError::DataInvariantViolation {
            detail: "stage4 raised confidence".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Invariant);
        assert!(!err.suggestions().is_empty());
    }
}
