//! `HoldingsClient` (§4.5): enriches a candidate OCLC number with
//! `{held_by_institution, total_holding_count, institution_symbols}` from
//! the bibs-holdings endpoint, a separate endpoint from search but sharing
//! the same rate-limit/retry policy and OAuth token.

use mediacat_store::HoldingsSummary;
use mediacat_utils::retry::{retry_with_policy, RetryPolicy};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::oauth::TokenCache;
use crate::types::{CatalogError, ClassifiedCatalogError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingsResponse {
    #[serde(default)]
    brief_records: Vec<BriefRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BriefRecord {
    #[serde(default)]
    institution_holding: Option<InstitutionHolding>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstitutionHolding {
    #[serde(default)]
    total_holding_count: u32,
    #[serde(default)]
    brief_holdings: Vec<BriefHolding>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BriefHolding {
    #[serde(default)]
    oclc_symbol: String,
}

pub struct HoldingsClient {
    client: reqwest::Client,
    holdings_url: String,
    tokens: Arc<TokenCache>,
    institution_symbol: String,
    retry_policy: RetryPolicy,
    timeout: Duration,
}

impl HoldingsClient {
    pub fn new(
        client: reqwest::Client,
        holdings_url: impl Into<String>,
        tokens: Arc<TokenCache>,
        institution_symbol: impl Into<String>,
    ) -> Self {
        Self {
            client,
            holdings_url: holdings_url.into(),
            tokens,
            institution_symbol: institution_symbol.into(),
            retry_policy: RetryPolicy::default(),
            timeout: Duration::from_secs(60),
        }
    }

    pub async fn fetch(&self, oclc_number: &str) -> Result<HoldingsSummary, CatalogError> {
        retry_with_policy(&self.retry_policy, "oclc-holdings", |_attempt| {
            self.fetch_once(oclc_number)
        })
        .await
        .map_err(|ClassifiedCatalogError(e)| e)
    }

    async fn fetch_once(&self, oclc_number: &str) -> Result<HoldingsSummary, ClassifiedCatalogError> {
        let token = self
            .tokens
            .get()
            .await
            .map_err(ClassifiedCatalogError)?;

        let response = self
            .client
            .get(&self.holdings_url)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .query(&[("oclcNumber", oclc_number), ("limit", "50")])
            .send()
            .await
            .map_err(|e| {
                ClassifiedCatalogError(if e.is_timeout() {
                    CatalogError::Timeout {
                        endpoint: self.holdings_url.clone(),
                        duration: self.timeout,
                    }
                } else {
                    CatalogError::Transport {
                        endpoint: self.holdings_url.clone(),
                        detail: mediacat_redaction::redact(&e.to_string()),
                    }
                })
            })?;

        let status = response.status();
        if status.as_u16() == 401 {
            self.tokens.refresh().await.map_err(ClassifiedCatalogError)?;
        }
        if status.as_u16() == 429 {
            return Err(ClassifiedCatalogError(CatalogError::Quota {
                endpoint: self.holdings_url.clone(),
                retry_after_secs: response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok()),
            }));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifiedCatalogError(CatalogError::ProviderHttp {
                endpoint: self.holdings_url.clone(),
                status: status.as_u16(),
                body: mediacat_redaction::redact(&body),
            }));
        }

        let parsed: HoldingsResponse = response.json().await.map_err(|e| {
            ClassifiedCatalogError(CatalogError::Parse {
                endpoint: self.holdings_url.clone(),
                detail: e.to_string(),
            })
        })?;

        let Some(holding) = parsed
            .brief_records
            .into_iter()
            .next()
            .and_then(|r| r.institution_holding)
        else {
            debug!(oclc_number, "no institution holding block returned");
            return Ok(HoldingsSummary::default());
        };

        let symbols: Vec<String> = holding
            .brief_holdings
            .into_iter()
            .map(|h| h.oclc_symbol)
            .filter(|s| !s.is_empty())
            .collect();
        let held_by_institution = symbols.iter().any(|s| s.eq_ignore_ascii_case(&self.institution_symbol));

        Ok(HoldingsSummary {
            held_by_institution,
            total_holding_count: holding.total_holding_count,
            institution_symbols: symbols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_summary_is_not_held() {
        let summary = HoldingsSummary::default();
        assert!(!summary.held_by_institution);
        assert_eq!(summary.total_holding_count, 0);
    }
}
