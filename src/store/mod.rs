//! Result persistence
//!
//! The server hands finished records to a [`ResultStore`] and reads them back
//! for `/results/{id}`. Records are opaque key → JSON blobs to the store; the
//! id is assigned here, never by the caller.

pub mod file;
pub mod memory;

pub use file::FileResultStore;
pub use memory::MemoryResultStore;

use crate::error::{AppError, Result};
use crate::models::{MeasurementRun, ResultRecord};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Key → record storage shared by all request handlers
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a snapshot of `run` and return the id it was stored under
    async fn save(&self, run: MeasurementRun) -> Result<ResultRecord>;

    /// Look up a stored record; unknown ids are [`AppError::NotFound`]
    async fn load(&self, id: &str) -> Result<ResultRecord>;

    /// Release the backing resources; later calls fail
    async fn close(&self) -> Result<()>;
}

/// Generate a fresh record id
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reject ids that could not have been generated by [`new_record_id`]
pub fn validate_record_id(id: &str) -> Result<()> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| AppError::not_found(format!("no result with id '{}'", id)))
}

/// Open the store described by the configuration: a directory when
/// `data_dir` is set, memory otherwise
pub async fn open_store(config: &crate::models::Config) -> Result<Arc<dyn ResultStore>> {
    match &config.data_dir {
        Some(dir) => Ok(Arc::new(FileResultStore::open(dir).await?)),
        None => Ok(Arc::new(MemoryResultStore::new())),
    }
}
