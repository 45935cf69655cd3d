//! In-process result store

use super::{new_record_id, ResultStore};
use crate::error::{AppError, Result};
use crate::models::{MeasurementRun, ResultRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Records kept as serialized JSON in a map, lost on restart
pub struct MemoryResultStore {
    // None once closed
    records: RwLock<Option<HashMap<String, Vec<u8>>>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Some(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.as_ref().map_or(0, HashMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, run: MeasurementRun) -> Result<ResultRecord> {
        let record = ResultRecord::new(new_record_id(), run);
        let blob = serde_json::to_vec(&record)
            .map_err(|e| AppError::storage(format!("cannot encode record {}: {}", record.id, e)))?;

        let mut guard = self.records.write().await;
        let records = guard.as_mut().ok_or_else(|| AppError::storage("result store is closed"))?;
        records.insert(record.id.clone(), blob);

        debug!(id = %record.id, "Result stored in memory");
        Ok(record)
    }

    async fn load(&self, id: &str) -> Result<ResultRecord> {
        let guard = self.records.read().await;
        let records = guard.as_ref().ok_or_else(|| AppError::storage("result store is closed"))?;
        let blob = records
            .get(id)
            .ok_or_else(|| AppError::not_found(format!("no result with id '{}'", id)))?;

        serde_json::from_slice(blob).map_err(|e| AppError::storage(format!("corrupt record {}: {}", id, e)))
    }

    async fn close(&self) -> Result<()> {
        self.records.write().await.take();
        Ok(())
    }
}
