//! `CostLedger`: append-only token/dollar accounting, committed serially
//! (§5: "The CostLedger accepts append-only events from all workers and
//! commits them serially").

use mediacat_config::LlmConfig;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct CostEvent {
    pub barcode: String,
    pub stage_tag: String,
    pub provider: String,
    pub model: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_usd: f64,
    pub batch: bool,
}

pub struct CostLedger {
    price_table: std::collections::HashMap<String, mediacat_config::ModelPrice>,
    batch_discount_multiplier: f64,
    events: Mutex<Vec<CostEvent>>,
}

impl CostLedger {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            price_table: config.price_table.clone(),
            batch_discount_multiplier: config.batch_discount_multiplier,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Price a call and append it to the ledger; returns the computed cost
    /// in USD so the caller can stamp it into the Item's per-stage record.
    pub fn record(
        &self,
        barcode: impl Into<String>,
        stage_tag: impl Into<String>,
        provider: impl Into<String>,
        model: &str,
        tokens_input: u64,
        tokens_output: u64,
        batch: bool,
    ) -> f64 {
        let price = self.price_table.get(model).copied().unwrap_or(mediacat_config::ModelPrice {
            input_per_1k: 0.0,
            output_per_1k: 0.0,
        });
        let mut cost = (tokens_input as f64 / 1000.0) * price.input_per_1k
            + (tokens_output as f64 / 1000.0) * price.output_per_1k;
        if batch {
            cost *= self.batch_discount_multiplier;
        }

        let event = CostEvent {
            barcode: barcode.into(),
            stage_tag: stage_tag.into(),
            provider: provider.into(),
            model: model.to_string(),
            tokens_input,
            tokens_output,
            cost_usd: cost,
            batch,
        };
        self.events.lock().expect("lock poisoned").push(event);
        cost
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.events.lock().expect("lock poisoned").iter().map(|e| e.cost_usd).sum()
    }

    pub fn events(&self) -> Vec<CostEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_calls_get_the_discount_multiplier() {
        let config = LlmConfig::default();
        let ledger = CostLedger::new(&config);
        let sync_cost = ledger.record("b1", "stage1", "anthropic", "claude-vision-default", 1000, 1000, false);
        let batch_cost = ledger.record("b2", "stage1", "anthropic", "claude-vision-default", 1000, 1000, true);
        assert!(batch_cost < sync_cost);
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn unknown_model_prices_at_zero_rather_than_panicking() {
        let config = LlmConfig::default();
        let ledger = CostLedger::new(&config);
        let cost = ledger.record("b1", "stage1", "anthropic", "unknown-model", 500, 500, false);
        assert_eq!(cost, 0.0);
    }
}
