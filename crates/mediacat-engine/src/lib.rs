//! Orchestration layer: turns a directory of scanned images into a
//! completed, disposition-routed run by driving the five stage workers
//! through a durable [`mediacat_store::WorkflowStore`].

pub mod controller;
pub mod export;
pub mod image_loader;
pub mod manifest;
pub mod prompts;
pub mod stage1;
pub mod stage1_parse;
pub mod stage2;
pub mod stage3;
pub mod stage4;
pub mod stage5;

pub use controller::{RunController, RunReport};
pub use export::write_run_outputs;
pub use image_loader::{load_image, ImageLoadError};
pub use manifest::{scan_item_directory, ManifestError};
pub use stage1::Stage1Pipeline;
pub use stage2::Stage2Pipeline;
pub use stage3::Stage3Pipeline;
pub use stage4::Stage4Pipeline;
pub use stage5::Stage5Pipeline;
