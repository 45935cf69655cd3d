//! Directory-backed result store: one `<id>.json` file per record

use super::{new_record_id, validate_record_id, ResultStore};
use crate::error::{AppError, Result};
use crate::models::{MeasurementRun, ResultRecord};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

pub struct FileResultStore {
    dir: PathBuf,
    closed: AtomicBool,
}

impl FileResultStore {
    /// Open (creating if needed) the store directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::storage(format!("cannot create {}: {}", dir.display(), e)))?;

        info!(dir = %dir.display(), "File result store opened");
        Ok(Self {
            dir,
            closed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(AppError::storage("result store is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ResultStore for FileResultStore {
    async fn save(&self, run: MeasurementRun) -> Result<ResultRecord> {
        self.ensure_open()?;

        let record = ResultRecord::new(new_record_id(), run);
        let blob = serde_json::to_vec_pretty(&record)
            .map_err(|e| AppError::storage(format!("cannot encode record {}: {}", record.id, e)))?;
        let path = self.path_for(&record.id);

        // Write next to the target and rename so readers never see half a record
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &blob)
            .await
            .map_err(|e| AppError::storage(format!("cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::storage(format!("cannot store {}: {}", path.display(), e)))?;

        debug!(id = %record.id, path = %path.display(), "Result stored");
        Ok(record)
    }

    async fn load(&self, id: &str) -> Result<ResultRecord> {
        self.ensure_open()?;
        validate_record_id(id)?;

        let path = self.path_for(id);
        let blob = match tokio::fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::not_found(format!("no result with id '{}'", id)));
            }
            Err(e) => return Err(AppError::storage(format!("cannot read {}: {}", path.display(), e))),
        };

        serde_json::from_slice(&blob).map_err(|e| AppError::storage(format!("corrupt record {}: {}", id, e)))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(dir = %self.dir.display(), "File result store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_run() -> MeasurementRun {
        MeasurementRun {
            latency: Some(23.456789),
            download: Some(94.12),
            upload: Some(41.0),
            jitter: None,
            packet_loss: Some(2.0),
        }
    }

    #[tokio::test]
    async fn test_record_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let saved = {
            let store = FileResultStore::open(temp.path()).await.unwrap();
            store.save(sample_run()).await.unwrap()
        };

        let store = FileResultStore::open(temp.path()).await.unwrap();
        let loaded = store.load(&saved.id).await.unwrap();
        assert_eq!(loaded, saved);
        assert!(temp.path().join(format!("{}.json", saved.id)).exists());
    }

    #[tokio::test]
    async fn test_open_creates_nested_dir() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        let store = FileResultStore::open(&nested).await.unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_not_found() {
        let temp = TempDir::new().unwrap();
        let store = FileResultStore::open(temp.path()).await.unwrap();

        let missing = store.load(&new_record_id()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let traversal = store.load("../secret").await;
        assert!(matches!(traversal, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_storage_error() {
        let temp = TempDir::new().unwrap();
        let store = FileResultStore::open(temp.path()).await.unwrap();
        let id = new_record_id();
        std::fs::write(temp.path().join(format!("{}.json", id)), b"{not json").unwrap();

        assert!(matches!(store.load(&id).await, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let temp = TempDir::new().unwrap();
        let store = FileResultStore::open(temp.path()).await.unwrap();
        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(store.save(sample_run()).await, Err(AppError::Storage(_))));
    }
}
