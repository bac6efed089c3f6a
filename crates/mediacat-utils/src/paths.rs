//! Shared filesystem helpers.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use std::fs;

#[derive(Debug, thiserror::Error)]
#[error("failed to create directory {path}: {source}")]
pub struct EnsureDirError {
    path: String,
    #[source]
    source: std::io::Error,
}

/// Create `path` and all missing parents, tolerating a benign "already
/// exists" race between concurrent stage workers.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<(), EnsureDirError> {
    match fs::create_dir_all(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(EnsureDirError {
            path: path.to_string(),
            source,
        }),
    }
}

/// The run directory name `results-<ISO-timestamp>/` per the output
/// contract. Callers needing determinism (tests, resume) should pass an
/// explicit `run_id` instead of calling this.
pub fn new_run_dir_name() -> String {
    format!("results-{}", Utc::now().format("%Y-%m-%dT%H-%M-%SZ"))
}

pub fn run_dir(base: &Utf8Path, run_id: &str) -> Utf8PathBuf {
    base.join(run_id)
}
