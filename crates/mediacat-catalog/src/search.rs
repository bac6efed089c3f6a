//! `CatalogSearchClient` (§4.4): queries OCLC WorldCat in priority order,
//! skips queries broader than `broad_query_threshold`, stops at the first
//! query returning non-empty results, and attaches holdings to every
//! returned candidate.

use mediacat_store::{Candidate, HoldingsSummary, QueryLogEntry};
use mediacat_utils::rate_limiter::RateLimiter;
use mediacat_utils::retry::{retry_with_policy, RetryPolicy};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::holdings::HoldingsClient;
use crate::oauth::TokenCache;
use crate::types::{CatalogError, ClassifiedCatalogError};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    number_of_records: u32,
    #[serde(default)]
    bib_records: Vec<BibRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BibRecord {
    identifier: Identifier,
    #[serde(default)]
    title: Option<TitleBlock>,
    #[serde(default)]
    contributor: Option<ContributorBlock>,
    #[serde(default)]
    publisher: Option<PublisherBlock>,
    #[serde(default)]
    date: Option<DateBlock>,
    #[serde(default)]
    format: Option<FormatBlock>,
    #[serde(default)]
    description: Option<DescriptionBlock>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identifier {
    #[serde(default)]
    oclc_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitleBlock {
    #[serde(default)]
    main_titles: Vec<TextField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextField {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributorBlock {
    #[serde(default)]
    creators: Vec<Creator>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Creator {
    #[serde(default)]
    non_person_name: Option<TextField>,
    #[serde(default)]
    first_name: Option<TextField>,
    #[serde(default)]
    second_name: Option<TextField>,
}

impl Creator {
    fn display_name(&self) -> Option<String> {
        if let Some(non_person) = &self.non_person_name
            && !non_person.text.is_empty()
        {
            return Some(non_person.text.clone());
        }
        let first = self.first_name.as_ref().map(|f| f.text.as_str()).unwrap_or_default();
        let second = self.second_name.as_ref().map(|f| f.text.as_str()).unwrap_or_default();
        let joined = format!("{first} {second}").trim().to_string();
        (!joined.is_empty()).then_some(joined)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublisherBlock {
    #[serde(default)]
    publishers: Vec<PublisherName>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublisherName {
    #[serde(default)]
    publisher_name: Option<TextField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateBlock {
    #[serde(default)]
    publication_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormatBlock {
    #[serde(default)]
    general_format: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptionBlock {
    #[serde(default)]
    contents: Vec<ContentItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentItem {
    #[serde(default)]
    titles: Vec<String>,
}

impl BibRecord {
    fn into_candidate(self, holdings: HoldingsSummary) -> Candidate {
        let title = self
            .title
            .and_then(|t| t.main_titles.into_iter().next())
            .map(|t| t.text)
            .unwrap_or_default();
        let contributors = self
            .contributor
            .map(|c| c.creators.into_iter().filter_map(|cr| cr.display_name()).collect())
            .unwrap_or_default();
        let publisher = self
            .publisher
            .and_then(|p| p.publishers.into_iter().next())
            .and_then(|p| p.publisher_name)
            .map(|t| t.text);
        let date = self.date.and_then(|d| d.publication_date);
        let format = self.format.and_then(|f| f.general_format);
        let track_titles = self
            .description
            .map(|d| d.contents.into_iter().flat_map(|c| c.titles).collect())
            .unwrap_or_default();

        Candidate {
            oclc_number: self.identifier.oclc_number,
            title,
            contributors,
            publisher,
            date,
            format,
            track_titles,
            holdings,
        }
    }
}

pub struct CatalogSearchClient {
    client: reqwest::Client,
    search_url: String,
    tokens: Arc<TokenCache>,
    holdings: Arc<HoldingsClient>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    broad_query_threshold: u32,
    timeout: Duration,
}

impl CatalogSearchClient {
    pub fn new(
        client: reqwest::Client,
        search_url: impl Into<String>,
        tokens: Arc<TokenCache>,
        holdings: Arc<HoldingsClient>,
        rate_limiter: Arc<RateLimiter>,
        broad_query_threshold: u32,
    ) -> Self {
        Self {
            client,
            search_url: search_url.into(),
            tokens,
            holdings,
            rate_limiter,
            retry_policy: RetryPolicy::default(),
            broad_query_threshold,
            timeout: Duration::from_secs(60),
        }
    }

    /// Tries `queries` in order. For each: rate-limit-acquire, then skip if
    /// the hit count exceeds `broad_query_threshold`; otherwise fetch up to
    /// `limit` records with holdings attached and stop at the first query
    /// with non-empty results (§4.4). Returns the candidates alongside a log
    /// of every query attempted, so `Stage2Record.query_log` can report hit
    /// counts and skipped-as-too-broad queries even when they contributed no
    /// candidates.
    pub async fn search(
        &self,
        queries: &[String],
        item_type: &str,
        sub_type: &str,
        limit: u32,
    ) -> Result<(Vec<Candidate>, Vec<QueryLogEntry>), CatalogError> {
        let mut query_log = Vec::with_capacity(queries.len());

        for query in queries {
            self.rate_limiter
                .acquire()
                .await
                .map_err(|_| CatalogError::DailyQuotaExceeded)?;

            let response = retry_with_policy(&self.retry_policy, "oclc-search", |_attempt| {
                self.search_once(query, item_type, sub_type, limit)
            })
            .await
            .map_err(|ClassifiedCatalogError(e)| e)?;

            if response.number_of_records > self.broad_query_threshold {
                info!(query, hits = response.number_of_records, "query too broad, skipping");
                query_log.push(QueryLogEntry {
                    query: query.clone(),
                    hit_count: response.number_of_records,
                    skipped_too_broad: true,
                });
                continue;
            }
            query_log.push(QueryLogEntry {
                query: query.clone(),
                hit_count: response.number_of_records,
                skipped_too_broad: false,
            });
            if response.bib_records.is_empty() {
                continue;
            }

            let mut candidates = Vec::with_capacity(response.bib_records.len());
            for record in response.bib_records {
                let oclc_number = record.identifier.oclc_number.clone();
                let holdings = match self.holdings.fetch(&oclc_number).await {
                    Ok(h) => h,
                    Err(e) => {
                        warn!(oclc_number, error = %e, "holdings lookup failed, defaulting to unheld");
                        HoldingsSummary::default()
                    }
                };
                candidates.push(record.into_candidate(holdings));
            }
            return Ok((candidates, query_log));
        }
        Ok((Vec::new(), query_log))
    }

    async fn search_once(
        &self,
        query: &str,
        item_type: &str,
        sub_type: &str,
        limit: u32,
    ) -> Result<SearchResponse, ClassifiedCatalogError> {
        let token = self.tokens.get().await.map_err(ClassifiedCatalogError)?;

        let response = self
            .client
            .get(&self.search_url)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .query(&[
                ("q", query),
                ("itemType", item_type),
                ("itemSubType", sub_type),
                ("limit", &limit.to_string()),
                ("offset", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                ClassifiedCatalogError(if e.is_timeout() {
                    CatalogError::Timeout {
                        endpoint: self.search_url.clone(),
                        duration: self.timeout,
                    }
                } else {
                    CatalogError::Transport {
                        endpoint: self.search_url.clone(),
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
                endpoint: self.search_url.clone(),
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
                endpoint: self.search_url.clone(),
                status: status.as_u16(),
                body: mediacat_redaction::redact(&body),
            }));
        }

        response.json().await.map_err(|e| {
            ClassifiedCatalogError(CatalogError::Parse {
                endpoint: self.search_url.clone(),
                detail: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_prefers_non_person_name() {
        let creator = Creator {
            non_person_name: Some(TextField {
                text: "Aretha Franklin".to_string(),
            }),
            first_name: None,
            second_name: None,
        };
        assert_eq!(creator.display_name(), Some("Aretha Franklin".to_string()));
    }

    #[test]
    fn creator_joins_first_and_second_name() {
        let creator = Creator {
            non_person_name: None,
            first_name: Some(TextField { text: "Aretha".to_string() }),
            second_name: Some(TextField { text: "Franklin".to_string() }),
        };
        assert_eq!(creator.display_name(), Some("Aretha Franklin".to_string()));
    }
}
