pub mod holdings;
pub mod oauth;
pub mod search;
pub mod types;

pub use holdings::HoldingsClient;
pub use oauth::TokenCache;
pub use search::CatalogSearchClient;
pub use types::{CatalogError, ClassifiedCatalogError};
