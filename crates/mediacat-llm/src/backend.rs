//! A standard chat-completions style HTTP backend: messages carry inline
//! image data URIs, as required for Stage-1 vision extraction (§6).

use async_trait::async_trait;
use mediacat_redaction::redact;
use mediacat_utils::retry::Retryable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{ContentPart, LlmBackend, LlmError, LlmRequest, LlmResult, Role};

pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    provider: String,
}

impl HttpChatBackend {
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

#[derive(Serialize)]
struct WireContentPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<WireImageUrl>,
}

#[derive(Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Vec<WireContentPart<'a>>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponseChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatResponseChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn to_wire_message(message: &crate::types::Message) -> WireMessage<'_> {
    let content = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => WireContentPart {
                kind: "text",
                text: Some(text.as_str()),
                image_url: None,
            },
            ContentPart::ImageBase64 { media_type, data } => WireContentPart {
                kind: "image_url",
                text: None,
                image_url: Some(WireImageUrl {
                    url: format!("data:{media_type};base64,{data}"),
                }),
            },
        })
        .collect();
    WireMessage {
        role: role_str(message.role),
        content,
    }
}

/// Error classification for retry: transient network/timeout/5xx/429 are
/// retryable, everything else is not (§7 `TransientRemote`/`QuotaExceeded`).
pub struct ClassifiedHttpError(pub LlmError);

impl Retryable for ClassifiedHttpError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.0,
            LlmError::Transport { .. } | LlmError::Timeout { .. } | LlmError::Quota { .. }
        ) || matches!(&self.0, LlmError::ProviderHttp { status, .. } if *status >= 500)
    }

    fn is_quota(&self) -> bool {
        matches!(self.0, LlmError::Quota { .. })
    }

    fn retry_after_hint(&self) -> Option<Duration> {
        match &self.0 {
            LlmError::Quota {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClassifiedHttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
impl LlmBackend for HttpChatBackend {
    async fn invoke(&self, request: &LlmRequest) -> Result<LlmResult, LlmError> {
        let wire_messages: Vec<WireMessage<'_>> = request.messages.iter().map(to_wire_message).collect();
        let body = ChatRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages: wire_messages,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: self.provider.clone(),
                        duration: request.timeout,
                    }
                } else {
                    LlmError::Transport {
                        provider: self.provider.clone(),
                        detail: redact(&e.to_string()),
                    }
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(LlmError::Quota {
                provider: self.provider.clone(),
                retry_after_secs,
            });
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderHttp {
                provider: self.provider.clone(),
                status: status.as_u16(),
                body: redact(&body_text),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::Parse {
            provider: self.provider.clone(),
            detail: e.to_string(),
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(LlmResult {
            barcode: request.barcode.clone(),
            raw_response: text,
            provider: self.provider.clone(),
            model_used: request.model.clone(),
            tokens_input: parsed.usage.as_ref().and_then(|u| u.prompt_tokens),
            tokens_output: parsed.usage.as_ref().and_then(|u| u.completion_tokens),
            cost_usd: None,
            batch: false,
            timed_out: false,
        })
    }

    fn provider_name(&self) -> &str {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn wire_message_carries_inline_image_data_uri() {
        let msg = Message::user(vec![
            ContentPart::text("front cover"),
            ContentPart::image("image/png", "QQ=="),
        ]);
        let wire = to_wire_message(&msg);
        let image_part = wire.content.iter().find(|p| p.kind == "image_url").unwrap();
        assert_eq!(
            image_part.image_url.as_ref().unwrap().url,
            "data:image/png;base64,QQ=="
        );
    }
}
