//! Builds the concrete component graph (HTTP clients, executor, stage
//! pipelines, controller) from a loaded [`Config`] plus the process
//! environment. Kept separate from `cli` so tests can construct a
//! controller without going through argument parsing.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use mediacat_alma::AlmaClient;
use mediacat_catalog::{CatalogSearchClient, HoldingsClient, TokenCache};
use mediacat_config::Config;
use mediacat_engine::{RunController, Stage1Pipeline, Stage2Pipeline, Stage3Pipeline, Stage4Pipeline, Stage5Pipeline};
use mediacat_llm::{CostLedger, HttpBatchProvider, HttpChatBackend, LlmExecutor};
use mediacat_store::{ManifestEntry, MediaKind, RunHandle, WorkflowStore};
use mediacat_utils::rate_limiter::RateLimiter;

pub type Controller = RunController<HttpChatBackend, HttpBatchProvider>;

/// Everything a run needs once the manifest is known: the controller plus
/// the pieces the CLI reports on afterward.
pub struct RunHandles {
    pub store: Arc<WorkflowStore>,
    pub handle: RunHandle,
    pub controller: Controller,
    pub ledger: Arc<CostLedger>,
}

/// Assembles the full component graph for one run against `input_dir`,
/// scanning it for a manifest of the given `media_kind` and opening (or
/// resuming) the run directory under `output_dir`/`run_id`.
pub fn build_run(config: &Config, input_dir: &Utf8Path, output_dir: &Utf8Path, run_id: &str, media_kind: MediaKind) -> Result<RunHandles> {
    let manifest: Vec<ManifestEntry> =
        mediacat_engine::scan_item_directory(input_dir, media_kind).context("scanning item directory")?;

    let run_dir = output_dir.join(run_id);
    let (store, handle) = WorkflowStore::create_or_load_run(&run_dir, run_id, &manifest).context("opening run directory")?;
    let store = Arc::new(store);

    let http_client = reqwest::Client::new();

    let chat_backend = Arc::new(
        HttpChatBackend::from_env(&config.llm.base_url, &config.llm.api_key_env, "primary")
            .context("building LLM chat backend")?,
    );
    let batch_provider = Arc::new(
        HttpBatchProvider::from_env(&config.llm.base_url, &config.llm.api_key_env, "primary")
            .context("building LLM batch provider")?,
    );
    let ledger = Arc::new(CostLedger::new(&config.llm));
    let executor = Arc::new(LlmExecutor::new(chat_backend, batch_provider, config.llm.clone(), ledger.clone()));

    let client_id = std::env::var(&config.catalog.client_id_env).context("reading OCLC client id")?;
    let client_secret = std::env::var(&config.catalog.client_secret_env).context("reading OCLC client secret")?;
    let tokens = Arc::new(TokenCache::new(http_client.clone(), &config.catalog.token_url, client_id, client_secret));
    let holdings = Arc::new(HoldingsClient::new(
        http_client.clone(),
        &config.catalog.holdings_url,
        tokens.clone(),
        &config.alma.institution_symbol,
    ));
    let catalog_rate_limiter = Arc::new(RateLimiter::new(
        "oclc-search",
        config.catalog.requests_per_second,
        Some(config.catalog.daily_request_limit),
    ));
    let search = Arc::new(CatalogSearchClient::new(
        http_client.clone(),
        &config.catalog.search_url,
        tokens,
        holdings,
        catalog_rate_limiter,
        config.thresholds.broad_query_threshold,
    ));

    let alma = Arc::new(AlmaClient::from_env(&config.alma.base_url, &config.alma.api_key_env).context("building Alma client")?);

    let controller = RunController::new(
        store.clone(),
        executor.clone(),
        Stage1Pipeline::new(executor.clone(), config.llm.vision_model.clone()),
        Stage2Pipeline::new(search, config.catalog.limit, config.run.worker_pool_size),
        Stage3Pipeline::new(executor, config.llm.selection_model.clone()),
        Stage4Pipeline::new(config.thresholds.clone()),
        Stage5Pipeline::new(alma, config.thresholds.clone(), config.run.worker_pool_size),
    );

    Ok(RunHandles {
        store,
        handle,
        controller,
        ledger,
    })
}
