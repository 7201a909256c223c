//! Job status records in the object store.
//!
//! One record per job at `{processing}{job_id}_status.json`, overwritten on
//! every stage change. Readers see whichever write landed last.
//!
//! Two write paths:
//! - `claim`: conditional write used once per run to take ownership of a job
//! - `write` / `record`: unconditional stage updates; `record` logs and
//!   swallows failures so a status update never changes a job's outcome

use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::{ObjectStore, Precondition, StoreError};
use crate::config::Namespaces;
use crate::domain::{JobId, StatusRecord};

const JSON: &str = "application/json";

/// A status record together with its version token
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub record: StatusRecord,

    /// `None` when no record exists and `record` is a synthesized PENDING
    pub etag: Option<String>,
}

impl StatusSnapshot {
    pub fn exists(&self) -> bool {
        self.etag.is_some()
    }

    /// Precondition that only succeeds if the record is still this version
    pub fn precondition(&self) -> Precondition {
        match &self.etag {
            Some(etag) => Precondition::Matches(etag.clone()),
            None => Precondition::DoesNotExist,
        }
    }
}

/// Reads and writes status records
#[derive(Clone)]
pub struct JobStatusStore {
    store: Arc<dyn ObjectStore>,
    namespaces: Namespaces,
}

impl JobStatusStore {
    pub fn new(store: Arc<dyn ObjectStore>, namespaces: Namespaces) -> Self {
        Self { store, namespaces }
    }

    /// Overwrite the status record of a job
    pub async fn write(&self, job_id: &JobId, record: &StatusRecord) -> Result<String, StoreError> {
        self.put(job_id, record, Precondition::None).await
    }

    /// Write the status record only if `precondition` holds
    pub async fn claim(
        &self,
        job_id: &JobId,
        record: &StatusRecord,
        precondition: Precondition,
    ) -> Result<String, StoreError> {
        self.put(job_id, record, precondition).await
    }

    /// Current status of a job, or a synthesized PENDING record for `file_key`
    pub async fn read(&self, job_id: &JobId, file_key: &str) -> Result<StatusSnapshot, StoreError> {
        let key = self.namespaces.status_key(job_id);
        match self.store.get(&key).await? {
            Some(object) => Ok(StatusSnapshot {
                record: serde_json::from_slice(&object.body)?,
                etag: Some(object.etag),
            }),
            None => Ok(StatusSnapshot {
                record: StatusRecord::pending(file_key),
                etag: None,
            }),
        }
    }

    /// Best-effort write: failures are logged, never returned
    pub async fn record(&self, job_id: &JobId, record: &StatusRecord) {
        if let Err(e) = self.write(job_id, record).await {
            warn!(
                %job_id,
                stage = %record.status,
                error = %e,
                "Failed to update status"
            );
        }
    }

    async fn put(
        &self,
        job_id: &JobId,
        record: &StatusRecord,
        precondition: Precondition,
    ) -> Result<String, StoreError> {
        let key = self.namespaces.status_key(job_id);
        let body = serde_json::to_vec_pretty(record)?;
        let etag = self.store.put(&key, body, JSON, precondition).await?;
        debug!(%job_id, stage = %record.status, progress = record.progress, "Status updated");
        Ok(etag)
    }
}
