//! `HttpBatchProvider`: a standard provider-batch HTTP client — submit a
//! JSONL body of typed requests, poll a job resource for completion,
//! download results as JSONL keyed by `custom_id` (§6 "Batch interface").

use async_trait::async_trait;
use mediacat_redaction::redact;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::executor::BatchProvider;
use crate::executor::BatchStatus;
use crate::types::{ContentPart, LlmError, LlmRequest, LlmResult, Message, Role};

pub struct HttpBatchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    provider: String,
}

impl HttpBatchProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            provider: provider.into(),
        }
    }

    pub fn from_env(base_url: impl Into<String>, api_key_env: &str, provider: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!("environment variable {api_key_env} is not set"))
        })?;
        Ok(Self::new(base_url, api_key, provider))
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Serialize)]
struct BatchLineContentPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<BatchLineImageUrl>,
}

#[derive(Serialize)]
struct BatchLineImageUrl {
    url: String,
}

#[derive(Serialize)]
struct BatchLineMessage<'a> {
    role: &'static str,
    content: Vec<BatchLineContentPart<'a>>,
}

#[derive(Serialize)]
struct BatchLineBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<BatchLineMessage<'a>>,
}

#[derive(Serialize)]
struct BatchLine<'a> {
    custom_id: &'a str,
    body: BatchLineBody<'a>,
}

fn to_batch_line<'a>(custom_id: &'a str, request: &'a LlmRequest) -> BatchLine<'a> {
    let messages = request
        .messages
        .iter()
        .map(|message: &Message| BatchLineMessage {
            role: role_str(message.role),
            content: message
                .content
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => BatchLineContentPart {
                        kind: "text",
                        text: Some(text.as_str()),
                        image_url: None,
                    },
                    ContentPart::ImageBase64 { media_type, data } => BatchLineContentPart {
                        kind: "image_url",
                        text: None,
                        image_url: Some(BatchLineImageUrl {
                            url: format!("data:{media_type};base64,{data}"),
                        }),
                    },
                })
                .collect(),
        })
        .collect();
    BatchLine {
        custom_id,
        body: BatchLineBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages,
        },
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    requests: Vec<BatchLine<'a>>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
}

#[derive(Deserialize)]
struct ResultLineChoice {
    message: ResultLineMessage,
}

#[derive(Deserialize)]
struct ResultLineMessage {
    content: String,
}

#[derive(Deserialize)]
struct ResultLineUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct ResultLineBody {
    choices: Vec<ResultLineChoice>,
    #[serde(default)]
    usage: Option<ResultLineUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ResultLine {
    custom_id: String,
    #[serde(default)]
    error: Option<ResultLineError>,
    #[serde(default)]
    response: Option<ResultLineBody>,
}

#[derive(Deserialize)]
struct ResultLineError {
    message: String,
}

#[async_trait]
impl BatchProvider for HttpBatchProvider {
    async fn submit_batch(&self, requests: &[(String, LlmRequest)]) -> Result<String, LlmError> {
        let lines: Vec<BatchLine<'_>> = requests.iter().map(|(id, req)| to_batch_line(id, req)).collect();
        let body = SubmitRequest { requests: lines };

        let response = self
            .client
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: self.provider.clone(),
                detail: redact(&e.to_string()),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderHttp {
                provider: self.provider.clone(),
                status,
                body: redact(&body_text),
            });
        }

        let parsed: SubmitResponse = response.json().await.map_err(|e| LlmError::Parse {
            provider: self.provider.clone(),
            detail: e.to_string(),
        })?;
        Ok(parsed.id)
    }

    async fn poll_status(&self, provider_id: &str) -> Result<BatchStatus, LlmError> {
        let response = self
            .client
            .get(format!("{}/batches/{provider_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: self.provider.clone(),
                detail: redact(&e.to_string()),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderHttp {
                provider: self.provider.clone(),
                status,
                body: redact(&body_text),
            });
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| LlmError::Parse {
            provider: self.provider.clone(),
            detail: e.to_string(),
        })?;

        Ok(match parsed.status.as_str() {
            "completed" | "ended" => BatchStatus::Completed,
            "failed" | "expired" => BatchStatus::Failed,
            "cancelled" | "cancelling" => BatchStatus::Cancelled,
            _ => BatchStatus::InProgress,
        })
    }

    async fn fetch_results(&self, provider_id: &str) -> Result<HashMap<String, Result<LlmResult, String>>, LlmError> {
        let response = self
            .client
            .get(format!("{}/batches/{provider_id}/results", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: self.provider.clone(),
                detail: redact(&e.to_string()),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderHttp {
                provider: self.provider.clone(),
                status,
                body: redact(&body_text),
            });
        }

        let body_text = response.text().await.map_err(|e| LlmError::Parse {
            provider: self.provider.clone(),
            detail: e.to_string(),
        })?;

        let mut results = HashMap::new();
        for line in body_text.lines().filter(|l| !l.trim().is_empty()) {
            let parsed: ResultLine = match serde_json::from_str(line) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(provider_id, error = %e, "skipping unparseable batch result line");
                    continue;
                }
            };

            let outcome = if let Some(err) = parsed.error {
                Err(err.message)
            } else if let Some(response_body) = parsed.response {
                let text = response_body
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default();
                Ok(LlmResult {
                    // Overwritten with the real barcode by the executor, which
                    // is the only place that still holds the custom_id map.
                    barcode: String::new(),
                    raw_response: text,
                    provider: self.provider.clone(),
                    model_used: response_body.model.unwrap_or_default(),
                    tokens_input: response_body.usage.as_ref().and_then(|u| u.prompt_tokens),
                    tokens_output: response_body.usage.as_ref().and_then(|u| u.completion_tokens),
                    cost_usd: None,
                    batch: true,
                    timed_out: false,
                })
            } else {
                Err("batch result line carried neither a response nor an error".to_string())
            };

            results.insert(parsed.custom_id, outcome);
        }

        Ok(results)
    }
}
