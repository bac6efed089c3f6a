pub mod backend;
pub mod batch_provider;
pub mod batching;
pub mod executor;
pub mod ledger;
pub mod types;

pub use backend::{ClassifiedHttpError, HttpChatBackend};
pub use batch_provider::HttpBatchProvider;
pub use executor::{BatchProvider, BatchStatus, LlmExecutor, ModeHint};
pub use ledger::{CostEvent, CostLedger};
pub use types::*;
