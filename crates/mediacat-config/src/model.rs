//! Configuration model. Each value's source (`cli`, `config`, `default`) is
//! not tracked per-field here (unlike the teacher's `ConfigSource`
//! bookkeeping) because mediacat has far fewer knobs; instead `Config`
//! documents its own precedence in `discovery.rs`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Name of the environment variable carrying the provider API key.
    pub api_key_env: String,
    pub base_url: String,
    pub vision_model: String,
    pub selection_model: String,
    /// Price per 1K input/output tokens, keyed by model name.
    pub price_table: std::collections::HashMap<String, ModelPrice>,
    pub batch_discount_multiplier: f64,
    pub batch_threshold: usize,
    pub max_sub_batch_bytes: usize,
    pub max_concurrent_requests: usize,
    pub batch_check_interval_secs: u64,
    pub batch_hard_deadline_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut price_table = std::collections::HashMap::new();
        price_table.insert(
            "claude-vision-default".to_string(),
            ModelPrice {
                input_per_1k: 0.003,
                output_per_1k: 0.015,
            },
        );
        Self {
            api_key_env: "MEDIACAT_LLM_API_KEY".to_string(),
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            vision_model: "claude-vision-default".to_string(),
            selection_model: "claude-vision-default".to_string(),
            price_table,
            batch_discount_multiplier: 0.5,
            batch_threshold: 20,
            max_sub_batch_bytes: 40 * 1024 * 1024,
            max_concurrent_requests: 5,
            batch_check_interval_secs: 30,
            batch_hard_deadline_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub token_url: String,
    pub search_url: String,
    pub holdings_url: String,
    pub client_id_env: String,
    pub client_secret_env: String,
    pub requests_per_second: u32,
    pub daily_request_limit: u32,
    pub limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            token_url: "https://oauth.oclc.org/token".to_string(),
            search_url: "https://worldcat.org/search/v2/bibs".to_string(),
            holdings_url: "https://worldcat.org/bibs-holdings".to_string(),
            client_id_env: "MEDIACAT_OCLC_CLIENT_ID".to_string(),
            client_secret_env: "MEDIACAT_OCLC_CLIENT_SECRET".to_string(),
            requests_per_second: 5,
            daily_request_limit: 50_000,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmaConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub institution_symbol: String,
    pub requests_per_second: u32,
}

impl Default for AlmaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-na.hosted.exlibrisgroup.com/almaws/v1/bibs".to_string(),
            api_key_env: "MEDIACAT_ALMA_API_KEY".to_string(),
            institution_symbol: "IXA".to_string(),
            requests_per_second: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub broad_query_threshold: u32,
    pub high_confidence_threshold: u8,
    pub review_threshold: u8,
    pub duplicate_title_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            broad_query_threshold: 1000,
            high_confidence_threshold: 80,
            review_threshold: 79,
            duplicate_title_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub worker_pool_size: usize,
    pub http_timeout_secs: u64,
    pub retry_base_secs: u64,
    pub retry_max_attempts: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 5,
            http_timeout_secs: 60,
            retry_base_secs: 30,
            retry_max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub alma: AlmaConfig,
    pub thresholds: Thresholds,
    pub run: RunConfig,
    pub log_json: bool,
}
