pub mod batch;
pub mod store;
pub mod types;

pub use batch::BatchJobHandle;
pub use store::{ManifestEntry, RunHandle, WorkflowStore};
pub use types::*;
