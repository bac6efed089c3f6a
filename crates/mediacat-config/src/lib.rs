pub mod discovery;
pub mod model;

pub use discovery::ConfigError;
pub use model::{AlmaConfig, CatalogConfig, Config, LlmConfig, ModelPrice, RunConfig, Thresholds};
