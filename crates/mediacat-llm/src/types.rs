//! Core types for the LLM backend abstraction, generalized from a
//! plain-text chat message to one carrying inline image attachments, since
//! Stage-1 extraction is vision-based (§6: "messages carrying inline image
//! data URIs").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single piece of message content: free text, or an inline base64 image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageBase64 { media_type: String, data: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::ImageBase64 {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Rough byte estimate used by adaptive sub-batching; base64 images
    /// dominate, so text parts are counted at their UTF-8 length and images
    /// at their encoded data length.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Self::Text { text } => text.len(),
            Self::ImageBase64 { data, .. } => data.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn estimated_bytes(&self) -> usize {
        self.content.iter().map(ContentPart::estimated_bytes).sum()
    }
}

/// One request in a batch or sync submission. `custom_id` is assigned by
/// the executor, not the caller, so it stays namespaced consistently across
/// sync and batch paths.
#[derive(Debug, Clone)]
#[allow(clippy::derivable_impls)]
pub struct LlmRequest {
    pub barcode: String,
    pub stage_tag: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmRequest {
    pub fn new(
        barcode: impl Into<String>,
        stage_tag: impl Into<String>,
        model: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            barcode: barcode.into(),
            stage_tag: stage_tag.into(),
            model: model.into(),
            messages,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
            metadata: HashMap::new(),
        }
    }

    pub fn estimated_bytes(&self) -> usize {
        self.messages.iter().map(Message::estimated_bytes).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub barcode: String,
    pub raw_response: String,
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
    pub cost_usd: Option<f64>,
    pub batch: bool,
    pub timed_out: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("transport error calling {provider}: {detail}")]
    Transport { provider: String, detail: String },

    #[error("request to {provider} timed out after {duration:?}")]
    Timeout { provider: String, duration: Duration },

    #[error("{provider} returned HTTP {status}: {body}")]
    ProviderHttp {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} quota or rate limit exceeded; retry after {retry_after_secs:?}s")]
    Quota {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    #[error("batch job {provider_id} failed: {detail}")]
    BatchFailed { provider_id: String, detail: String },

    #[error("failed to parse {provider} response: {detail}")]
    Parse { provider: String, detail: String },

    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
}

/// Per-request outcome from a batch or sync submission: either a result or
/// a recorded per-request failure. Partial batch failure never fails the
/// whole submission (§4.3, §7 `ProviderBatchFailure`).
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    Ok(LlmResult),
    Failed { barcode: String, error: String },
}

/// All providers implement this trait for a single synchronous call; the
/// executor layers batching and retry on top.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn invoke(&self, request: &LlmRequest) -> Result<LlmResult, LlmError>;
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_bytes_dominated_by_image_payload() {
        let msg = Message::user(vec![
            ContentPart::text("describe this cover"),
            ContentPart::image("image/png", "A".repeat(1_000_000)),
        ]);
        assert!(msg.estimated_bytes() > 999_000);
    }
}
