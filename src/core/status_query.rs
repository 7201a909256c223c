//! Status query handler.
//!
//! Read-only: answers "where is my upload?" from the status record alone and
//! never writes. A missing record means the job has not started yet, so the
//! answer is a synthesized PENDING rather than an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::limits::ValidationError;
use super::status_store::JobStatusStore;
use crate::adapters::{ObjectStore, StoreError};
use crate::config::Namespaces;
use crate::domain::{Stage, StatusRecord, StatusView};

/// Status query errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answers status queries by upload key
pub struct StatusQueryHandler {
    store: Arc<dyn ObjectStore>,
    statuses: JobStatusStore,
    namespaces: Namespaces,
    result_grant_ttl: Duration,
    stale_after: Duration,
}

impl StatusQueryHandler {
    pub fn new(store: Arc<dyn ObjectStore>, namespaces: Namespaces) -> Self {
        Self {
            statuses: JobStatusStore::new(store.clone(), namespaces.clone()),
            store,
            namespaces,
            result_grant_ttl: Duration::from_secs(300),
            stale_after: Duration::from_secs(1800),
        }
    }

    /// Lifetime of the result download URLs
    pub fn with_result_grant_ttl(mut self, ttl: Duration) -> Self {
        self.result_grant_ttl = ttl;
        self
    }

    /// Age after which an unfinished job is reported as failed
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Current status of the job behind an upload key
    #[instrument(skip(self))]
    pub async fn query(&self, file_key: &str) -> Result<StatusView, QueryError> {
        if file_key.trim().is_empty() {
            return Err(ValidationError::MissingField("fileKey").into());
        }
        let job_id = self.namespaces.job_id(file_key)?;
        let now = Utc::now();

        let snapshot = self.statuses.read(&job_id, file_key).await?;
        if !snapshot.exists() {
            info!(%job_id, "No status record, job not started");
            return Ok(StatusView::from_record(snapshot.record, now));
        }

        let record = snapshot.record;
        info!(%job_id, stage = %record.status, "Status found");

        if record.is_stale(now, self.stale_after) {
            warn!(%job_id, stage = %record.status, since = %record.timestamp, "Job stopped advancing");
            let mut view = StatusView::from_record(stalled(record), now);
            view.stale = true;
            return Ok(view);
        }

        let artifacts = record.artifacts();
        let mut view = StatusView::from_record(record, now);
        if let Some(keys) = artifacts {
            view.resultado_download_url = self.download_url(&keys.result_key);
            view.transcripcion_download_url = self.download_url(&keys.transcript_key);
        }
        Ok(view)
    }

    /// Mint a result read URL; failure only drops the URL from the answer
    fn download_url(&self, key: &str) -> Option<String> {
        match self.store.presign_get(key, self.result_grant_ttl) {
            Ok(grant) => Some(grant.url),
            Err(e) => {
                warn!(key, error = %e, "Failed to mint download URL");
                None
            }
        }
    }
}

/// ERROR view of a record that stopped advancing
fn stalled(record: StatusRecord) -> StatusRecord {
    let since: DateTime<Utc> = record.timestamp;
    let message = format!(
        "Error: processing stalled in {} since {}",
        record.status,
        since.to_rfc3339()
    );
    StatusRecord {
        status: Stage::Error,
        progress: Stage::Error.progress(),
        message,
        ..record
    }
}
