//! `AlmaClient` (§4.6): given an OCLC number, answers
//! `(exists_in_local_catalog, local_id | nil)`, trying both the
//! `(OCoLC)<n>`-prefixed and bare spellings since different Alma
//! configurations index `other_system_id` either way. Rate limit 20
//! requests/second (§4.6, §5).

use mediacat_utils::rate_limiter::RateLimiter;
use mediacat_utils::retry::{retry_with_policy, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::types::{AlmaError, BibsResponse, ClassifiedAlmaError};

pub struct AlmaClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    timeout: Duration,
}

impl AlmaClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::new("alma", 20, None)),
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_env(base_url: impl Into<String>, api_key_env: &str) -> Result<Self, AlmaError> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| AlmaError::Misconfiguration(format!("environment variable {api_key_env} is not set")))?;
        Ok(Self::new(reqwest::Client::new(), base_url, api_key))
    }

    /// Tries `(OCoLC)<n>` then the bare number, returning the first match.
    pub async fn verify(&self, oclc_number: &str) -> Result<(bool, Option<String>), AlmaError> {
        let bare = oclc_number.trim_start_matches("(OCoLC)").trim();
        let spellings = [format!("(OCoLC){bare}"), bare.to_string()];

        for spelling in &spellings {
            self.rate_limiter.acquire().await.ok();
            let response = retry_with_policy(&self.retry_policy, "alma", |_attempt| self.query_once(spelling))
                .await
                .map_err(|ClassifiedAlmaError(e)| e)?;

            if response.total_record_count > 0
                && let Some(mms_id) = response.bibs.into_iter().find_map(|b| b.mms_id)
            {
                return Ok((true, Some(mms_id)));
            }
        }
        Ok((false, None))
    }

    async fn query_once(&self, other_system_id: &str) -> Result<BibsResponse, ClassifiedAlmaError> {
        let response = self
            .client
            .get(&self.base_url)
            .header("Authorization", format!("apikey {}", self.api_key))
            .header("Accept", "application/xml")
            .timeout(self.timeout)
            .query(&[("other_system_id", other_system_id), ("limit", "1")])
            .send()
            .await
            .map_err(|e| {
                ClassifiedAlmaError(if e.is_timeout() {
                    AlmaError::Timeout { duration: self.timeout }
                } else {
                    AlmaError::Transport {
                        detail: mediacat_redaction::redact(&e.to_string()),
                    }
                })
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ClassifiedAlmaError(AlmaError::Quota {
                retry_after_secs: response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok()),
            }));
        }
        // A 400 means this id spelling was rejected; treat it as "no match"
        // for this spelling rather than a hard failure, matching the
        // original's try-next-format behavior.
        if status.as_u16() == 400 {
            debug!(other_system_id, "alma rejected id spelling, trying next");
            return Ok(BibsResponse {
                total_record_count: 0,
                bibs: Vec::new(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifiedAlmaError(AlmaError::ProviderHttp {
                status: status.as_u16(),
                body: mediacat_redaction::redact(&body),
            }));
        }

        let body = response.text().await.map_err(|e| {
            ClassifiedAlmaError(AlmaError::Transport {
                detail: e.to_string(),
            })
        })?;
        quick_xml::de::from_str(&body).map_err(|e| {
            ClassifiedAlmaError(AlmaError::Parse {
                detail: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_found_response() {
        let xml = r#"<bibs><total_record_count>1</total_record_count><bib><mms_id>9910012345</mms_id></bib></bibs>"#;
        let parsed: BibsResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.total_record_count, 1);
        assert_eq!(parsed.bibs[0].mms_id.as_deref(), Some("9910012345"));
    }

    #[test]
    fn parses_not_found_response() {
        let xml = r#"<bibs><total_record_count>0</total_record_count></bibs>"#;
        let parsed: BibsResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.total_record_count, 0);
        assert!(parsed.bibs.is_empty());
    }
}
