pub mod client;
pub mod types;

pub use client::AlmaClient;
pub use types::AlmaError;
