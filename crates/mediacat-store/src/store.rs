//! `WorkflowStore`: durable, append-safe, resumable persistence for Items
//! and batch-job handles (§4.1).
//!
//! Single writer per stage is enforced two ways: a barcode-keyed mutex
//! serializes read-modify-write cycles on one Item (so two stage workers
//! never race on the same barcode), and a single process-wide write mutex
//! serializes the actual file write (the whole map is one JSON document
//! keyed by barcode, per §6 Outputs). Readers (`get`, `list_pending`) only
//! ever observe the in-memory map, which is populated exclusively from
//! committed writes — never from a partially-written file.

use camino::{Utf8Path, Utf8PathBuf};
use mediacat_utils::atomic_write::write_file_atomic;
use mediacat_utils::error::{MediaCatError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::batch::BatchJobHandle;
use crate::types::{ImageRef, Item, ItemStatus, MediaKind};

const WORKFLOW_FILE: &str = "workflow.json";
const BATCH_JOBS_FILE: &str = "batch_jobs.json";

/// One entry of the item manifest the `ItemSource` hands to
/// `create_or_load_run`: a barcode and its ordered image references.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub barcode: String,
    pub media_kind: MediaKind,
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: String,
    pub run_dir: Utf8PathBuf,
}

pub struct WorkflowStore {
    run_dir: Utf8PathBuf,
    items: RwLock<HashMap<String, Item>>,
    barcode_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    write_mutex: Mutex<()>,
    batch_jobs: RwLock<Vec<BatchJobHandle>>,
}

impl WorkflowStore {
    fn workflow_path(run_dir: &Utf8Path) -> Utf8PathBuf {
        run_dir.join(WORKFLOW_FILE)
    }

    fn batch_jobs_path(run_dir: &Utf8Path) -> Utf8PathBuf {
        run_dir.join(BATCH_JOBS_FILE)
    }

    /// Idempotent: if a run already exists at `run_dir`, its persisted state
    /// is loaded and the manifest is ignored except to report new barcodes
    /// (new barcodes discovered since the run began are appended with
    /// `Created` status).
    pub fn create_or_load_run(
        run_dir: &Utf8Path,
        run_id: &str,
        manifest: &[ManifestEntry],
    ) -> Result<(Self, RunHandle)> {
        mediacat_utils::paths::ensure_dir_all(run_dir).map_err(|e| {
            MediaCatError::PersistenceError {
                path: run_dir.to_string(),
                source: std::io::Error::other(e.to_string()),
            }
        })?;

        let workflow_path = Self::workflow_path(run_dir);
        let mut items: HashMap<String, Item> = if workflow_path.exists() {
            let content = std::fs::read_to_string(workflow_path.as_std_path()).map_err(|e| {
                MediaCatError::PersistenceError {
                    path: workflow_path.to_string(),
                    source: e,
                }
            })?;
            serde_json::from_str(&content).map_err(|e| MediaCatError::ParseError {
                what: "workflow state file".to_string(),
                barcode: "*".to_string(),
                detail: e.to_string(),
            })?
        } else {
            HashMap::new()
        };

        for entry in manifest {
            items.entry(entry.barcode.clone()).or_insert_with(|| {
                Item::new(entry.barcode.clone(), entry.media_kind, entry.images.clone())
            });
        }

        let batch_jobs_path = Self::batch_jobs_path(run_dir);
        let batch_jobs: Vec<BatchJobHandle> = if batch_jobs_path.exists() {
            let content = std::fs::read_to_string(batch_jobs_path.as_std_path()).map_err(|e| {
                MediaCatError::PersistenceError {
                    path: batch_jobs_path.to_string(),
                    source: e,
                }
            })?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            Vec::new()
        };

        // An item's persisted status is always its last *committed* stage,
        // never an in-progress marker (`update` only writes after a stage
        // worker finishes), so there is nothing dangling to reconcile here.
        // An item claimed by a still-open batch job is simply whatever
        // status it had before the crash; `resume_open_jobs` in the LLM
        // executor is what reclaims it, driven by `list_open_batch_jobs`.

        let store = Self {
            run_dir: run_dir.to_owned(),
            items: RwLock::new(items),
            barcode_locks: Mutex::new(HashMap::new()),
            write_mutex: Mutex::new(()),
            batch_jobs: RwLock::new(batch_jobs),
        };
        store.persist()?;

        info!(run_id, run_dir = %run_dir, "workflow store ready");

        Ok((
            store,
            RunHandle {
                run_id: run_id.to_string(),
                run_dir: run_dir.to_owned(),
            },
        ))
    }

    fn barcode_lock(&self, barcode: &str) -> Arc<Mutex<()>> {
        let mut locks = self.barcode_locks.lock().expect("lock poisoned");
        locks
            .entry(barcode.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn persist(&self) -> Result<()> {
        let _guard = self.write_mutex.lock().expect("lock poisoned");
        let items = self.items.read().expect("lock poisoned");
        let json = serde_json::to_string_pretty(&*items).map_err(|e| {
            MediaCatError::PersistenceError {
                path: self.run_dir.to_string(),
                source: std::io::Error::other(e.to_string()),
            }
        })?;
        write_file_atomic(&Self::workflow_path(&self.run_dir), &json)?;
        drop(items);

        let batch_jobs = self.batch_jobs.read().expect("lock poisoned");
        let batch_json = serde_json::to_string_pretty(&*batch_jobs).map_err(|e| {
            MediaCatError::PersistenceError {
                path: self.run_dir.to_string(),
                source: std::io::Error::other(e.to_string()),
            }
        })?;
        write_file_atomic(&Self::batch_jobs_path(&self.run_dir), &batch_json)?;
        Ok(())
    }

    pub fn get(&self, barcode: &str) -> Option<Item> {
        self.items.read().expect("lock poisoned").get(barcode).cloned()
    }

    /// Items whose status is exactly `stage`, i.e. ready to enter the next
    /// stage.
    pub fn list_pending(&self, stage: ItemStatus) -> Vec<Item> {
        self.items
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|item| item.status == stage)
            .cloned()
            .collect()
    }

    pub fn all_items(&self) -> Vec<Item> {
        self.items.read().expect("lock poisoned").values().cloned().collect()
    }

    /// Atomically apply `mutate` to the Item for `barcode` and commit the
    /// whole map to disk. `mutate` is responsible for advancing `status`;
    /// an illegal forward transition is rejected without writing anything.
    pub fn update(
        &self,
        barcode: &str,
        mutate: impl FnOnce(&mut Item),
    ) -> Result<Item> {
        let lock = self.barcode_lock(barcode);
        let _guard = lock.lock().expect("lock poisoned");

        let mut items = self.items.write().expect("lock poisoned");
        let item = items
            .get_mut(barcode)
            .ok_or_else(|| MediaCatError::DataInvariantViolation {
                detail: format!("update called for unknown barcode {barcode}"),
            })?;
        let previous_status = item.status;
        mutate(item);
        if item.status != previous_status && !previous_status.can_advance_to(item.status) {
            // Roll back: persisted state is ground truth and we never wrote
            // this mutation to disk, so just restore the in-memory field.
            let illegal = item.status;
            item.status = previous_status;
            return Err(MediaCatError::DataInvariantViolation {
                detail: format!(
                    "illegal status transition for {barcode}: {previous_status:?} -> {illegal:?}"
                ),
            });
        }
        let updated = item.clone();
        drop(items);
        self.persist()?;
        Ok(updated)
    }

    pub fn register_batch_job(&self, handle: BatchJobHandle) -> Result<()> {
        self.batch_jobs.write().expect("lock poisoned").push(handle);
        self.persist()
    }

    pub fn list_open_batch_jobs(&self) -> Vec<BatchJobHandle> {
        self.batch_jobs
            .read()
            .expect("lock poisoned")
            .iter()
            .filter(|j| !j.closed)
            .cloned()
            .collect()
    }

    pub fn close_batch_job(&self, provider_id: &str) -> Result<()> {
        {
            let mut jobs = self.batch_jobs.write().expect("lock poisoned");
            if let Some(job) = jobs.iter_mut().find(|j| j.provider_id == provider_id) {
                job.closed = true;
            } else {
                warn!(provider_id, "close_batch_job called for unknown job");
            }
        }
        self.persist()
    }

    pub fn run_dir(&self) -> &Utf8Path {
        &self.run_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageRole;
    use tempfile::tempdir;

    fn manifest(barcode: &str) -> ManifestEntry {
        ManifestEntry {
            barcode: barcode.to_string(),
            media_kind: MediaKind::Cd,
            images: vec![ImageRef {
                role: ImageRole::Front,
                path: "front.png".to_string(),
            }],
        }
    }

    #[test]
    fn create_or_load_run_is_idempotent() {
        let dir = tempdir().unwrap();
        let run_dir = Utf8PathBuf::from_path_buf(dir.path().join("results-1")).unwrap();
        let manifest = vec![manifest("0591730173591")];

        let (store1, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &manifest).unwrap();
        store1
            .update("0591730173591", |item| item.status = ItemStatus::Stage1Done)
            .unwrap();
        drop(store1);

        let (store2, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &manifest).unwrap();
        let item = store2.get("0591730173591").unwrap();
        assert_eq!(item.status, ItemStatus::Stage1Done);
    }

    #[test]
    fn update_rejects_illegal_transition() {
        let dir = tempdir().unwrap();
        let run_dir = Utf8PathBuf::from_path_buf(dir.path().join("results-1")).unwrap();
        let manifest = vec![manifest("0591730173591")];
        let (store, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &manifest).unwrap();

        let result = store.update("0591730173591", |item| item.status = ItemStatus::Stage2Done);
        assert!(result.is_err());
        assert_eq!(store.get("0591730173591").unwrap().status, ItemStatus::Created);
    }

    #[test]
    fn list_pending_filters_by_status() {
        let dir = tempdir().unwrap();
        let run_dir = Utf8PathBuf::from_path_buf(dir.path().join("results-1")).unwrap();
        let manifest = vec![manifest("a"), manifest("b")];
        let (store, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &manifest).unwrap();
        store.update("a", |item| item.status = ItemStatus::Stage1Done).unwrap();

        let pending = store.list_pending(ItemStatus::Created);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].barcode, "b");
    }

    #[test]
    fn batch_job_registry_round_trips() {
        let dir = tempdir().unwrap();
        let run_dir = Utf8PathBuf::from_path_buf(dir.path().join("results-1")).unwrap();
        let (store, _) = WorkflowStore::create_or_load_run(&run_dir, "run1", &[]).unwrap();

        let mut map = HashMap::new();
        map.insert("stage1_0_abc".to_string(), "barcode1".to_string());
        store
            .register_batch_job(BatchJobHandle::new("batch_abc123", "stage1", map))
            .unwrap();

        assert_eq!(store.list_open_batch_jobs().len(), 1);
        store.close_batch_job("batch_abc123").unwrap();
        assert_eq!(store.list_open_batch_jobs().len(), 0);
    }
}
