pub mod engine;
pub mod export;

pub use engine::{assign_dispositions, DispositionInput};
pub use export::{render_alma_batch_export, ExportRow};
