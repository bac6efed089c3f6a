//! OAuth2 client-credentials token caching for the OCLC WorldCat API (§6:
//! "OAuth2 client-credentials token with scope `wcapi`"). The token is
//! cached in memory and refreshed proactively before expiry or reactively
//! on a 401 from a downstream call (§4.4 "authentication token is cached
//! and refreshed on 401").

use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::CatalogError;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    1200
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct TokenCache {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: "wcapi".to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a cached token if it has at least 30s of remaining life,
    /// otherwise fetches a fresh one.
    pub async fn get(&self) -> Result<String, CatalogError> {
        {
            let cached = self.cached.lock().expect("lock poisoned");
            if let Some(token) = cached.as_ref()
                && token.expires_at > Instant::now() + Duration::from_secs(30)
            {
                return Ok(token.access_token.clone());
            }
        }
        self.refresh().await
    }

    /// Forces a fresh token fetch, used when a downstream call reports 401.
    pub async fn refresh(&self) -> Result<String, CatalogError> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", &self.scope)])
            .send()
            .await
            .map_err(|e| CatalogError::Auth {
                detail: mediacat_redaction::redact(&e.to_string()),
            })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth {
                detail: mediacat_redaction::redact(&body),
            });
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| CatalogError::Auth {
            detail: e.to_string(),
        })?;

        let mut cached = self.cached.lock().expect("lock poisoned");
        *cached = Some(CachedToken {
            access_token: parsed.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });
        Ok(parsed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_expires_in_is_reasonable() {
        assert!(default_expires_in() > 0);
    }
}
