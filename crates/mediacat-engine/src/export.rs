//! Run output writing (§6 Outputs): the Alma batch-upload file, a
//! deduplicated candidate index, run metrics, the needs-attention (failed
//! item) report, and per-call provenance logs — everything besides
//! `workflow.json`/`batch_jobs.json`, which `WorkflowStore` owns directly.

use std::collections::HashMap;

use camino::Utf8Path;
use mediacat_disposition::{render_alma_batch_export, ExportRow};
use mediacat_llm::CostLedger;
use mediacat_store::{Candidate, ItemStatus, WorkflowStore};
use mediacat_utils::atomic_write::write_file_atomic;
use mediacat_utils::error::{MediaCatError, Result};
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
struct RunMetrics {
    total_items: usize,
    by_status: HashMap<String, usize>,
    by_disposition: HashMap<String, usize>,
    total_cost_usd: f64,
    total_tokens_input: u64,
    total_tokens_output: u64,
}

fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| MediaCatError::PersistenceError {
        path: path.to_string(),
        source: std::io::Error::other(e.to_string()),
    })?;
    write_file_atomic(path, &json)?;
    Ok(())
}

/// Writes every output artifact for the run at `store.run_dir()`:
/// `candidates.json`, `metrics.json`, `alma_batch_export.txt`,
/// `needs_attention.json`, and `logs/token_usage.json` plus a per-stage
/// JSONL provenance log of raw LLM responses.
pub fn write_run_outputs(store: &WorkflowStore, ledger: &CostLedger) -> Result<()> {
    let run_dir = store.run_dir().to_owned();
    let items = store.all_items();

    // candidates.json: every Stage-2 candidate ever surfaced, keyed by OCLC
    // number so repeated sightings across Items collapse to one entry.
    let mut candidates: HashMap<String, Candidate> = HashMap::new();
    for item in &items {
        if let Some(stage2) = &item.stage2 {
            for candidate in &stage2.candidates {
                candidates.entry(candidate.oclc_number.clone()).or_insert_with(|| candidate.clone());
            }
        }
    }
    write_json(&run_dir.join("candidates.json"), &candidates)?;

    let mut metrics = RunMetrics {
        total_items: items.len(),
        ..Default::default()
    };
    for item in &items {
        *metrics.by_status.entry(format!("{:?}", item.status)).or_default() += 1;
        if let Some(stage5) = &item.stage5
            && let Some(disposition) = stage5.disposition
        {
            *metrics.by_disposition.entry(disposition.label().to_string()).or_default() += 1;
        }
    }
    metrics.total_cost_usd = ledger.total_cost_usd();
    for event in ledger.events() {
        metrics.total_tokens_input += event.tokens_input;
        metrics.total_tokens_output += event.tokens_output;
    }
    write_json(&run_dir.join("metrics.json"), &metrics)?;

    let export_rows: Vec<ExportRow> = items
        .iter()
        .filter_map(|item| {
            let stage3 = item.stage3.as_ref()?;
            let stage5 = item.stage5.as_ref()?;
            Some(ExportRow {
                barcode: item.barcode.clone(),
                oclc_number: stage3.selected_oclc.clone(),
                title: stage5.authoritative_title.clone().unwrap_or_default(),
                disposition: stage5.disposition,
            })
        })
        .collect();
    let export_text = render_alma_batch_export(&export_rows);
    write_file_atomic(&run_dir.join("alma_batch_export.txt"), &export_text)?;

    let needs_attention: Vec<&mediacat_store::Item> = items.iter().filter(|i| i.status == ItemStatus::Failed).collect();
    write_json(&run_dir.join("needs_attention.json"), &needs_attention)?;

    #[derive(Serialize)]
    struct TokenUsageRow {
        barcode: String,
        stage_tag: String,
        provider: String,
        model: String,
        tokens_input: u64,
        tokens_output: u64,
        cost_usd: f64,
        batch: bool,
    }
    let token_usage: Vec<TokenUsageRow> = ledger
        .events()
        .into_iter()
        .map(|e| TokenUsageRow {
            barcode: e.barcode,
            stage_tag: e.stage_tag,
            provider: e.provider,
            model: e.model,
            tokens_input: e.tokens_input,
            tokens_output: e.tokens_output,
            cost_usd: e.cost_usd,
            batch: e.batch,
        })
        .collect();

    let logs_dir = run_dir.join("logs");
    write_json(&logs_dir.join("token_usage.json"), &token_usage)?;

    let stage1_responses: Vec<(&str, &str)> = items
        .iter()
        .filter_map(|i| i.stage1.as_ref().map(|s| (i.barcode.as_str(), s.raw_response.as_str())))
        .collect();
    write_json(&logs_dir.join("stage1_responses.json"), &stage1_responses)?;

    Ok(())
}
