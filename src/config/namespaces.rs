//! Key layout of the bucket.
//!
//! Single source of truth for object keys. Intake and status queries both go
//! through [`Namespaces::job_id`], so the two always agree on which status
//! record belongs to an upload.
//!
//! | Prefix | Written by | Contents |
//! |--------|------------|----------|
//! | `uploads/` | clients (via upload grants) | raw audio |
//! | `processing/` | intake | `{job_id}_status.json` |
//! | `results/` | intake | `{job_id}_{stamp}_resultado.json`, `{job_id}_{stamp}_transcripcion.json` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::object_store::validate_key;
use crate::core::ValidationError;
use crate::domain::{ArtifactKeys, JobId};

/// Prefixes of the three key namespaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespaces {
    /// Inbound audio; only objects under this prefix trigger a job
    #[serde(default = "default_uploads")]
    pub uploads: String,

    /// Status records
    #[serde(default = "default_processing")]
    pub processing: String,

    /// Result artifacts
    #[serde(default = "default_results")]
    pub results: String,
}

fn default_uploads() -> String {
    "uploads/".to_string()
}
fn default_processing() -> String {
    "processing/".to_string()
}
fn default_results() -> String {
    "results/".to_string()
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            uploads: default_uploads(),
            processing: default_processing(),
            results: default_results(),
        }
    }
}

impl Namespaces {
    /// Whether an object key lies in the inbound namespace
    pub fn is_inbound(&self, key: &str) -> bool {
        key.starts_with(&self.uploads) && key.len() > self.uploads.len()
    }

    /// Derive the job id of an upload key.
    ///
    /// Strips the uploads prefix (when present) and the extension of the last
    /// path segment. Pure: the same key always yields the same id. Keys whose
    /// status record could not be stored (empty segments, `..`, backslashes)
    /// are malformed.
    pub fn job_id(&self, key: &str) -> Result<JobId, ValidationError> {
        let key = key.trim();
        let base = key.strip_prefix(self.uploads.as_str()).unwrap_or(key);

        let segment_start = base.rfind('/').map(|i| i + 1).unwrap_or(0);
        let stem_end = match base[segment_start..].rfind('.') {
            Some(dot) if dot > 0 => segment_start + dot,
            _ => base.len(),
        };
        let id = &base[..stem_end];

        if id.is_empty() || id.ends_with('/') {
            return Err(ValidationError::MalformedKey(key.to_string()));
        }

        let job_id = JobId::new(id);
        if validate_key(&self.status_key(&job_id)).is_err() {
            return Err(ValidationError::MalformedKey(key.to_string()));
        }
        Ok(job_id)
    }

    /// Key of the status record of a job
    pub fn status_key(&self, job_id: &JobId) -> String {
        format!("{}{}_status.json", self.processing, job_id)
    }

    /// Keys of the two result artifacts of a job finishing at `finished_at`
    pub fn result_keys(&self, job_id: &JobId, finished_at: DateTime<Utc>) -> ArtifactKeys {
        let stamp = finished_at.format("%Y%m%d_%H%M%S");
        ArtifactKeys {
            result_key: format!("{}{}_{}_resultado.json", self.results, job_id, stamp),
            transcript_key: format!("{}{}_{}_transcripcion.json", self.results, job_id, stamp),
        }
    }

    /// Key of a new upload
    pub fn upload_key(&self, stamp: DateTime<Utc>, short_id: &str, stem: &str, ext: &str) -> String {
        format!(
            "{}{}_{}_{}.{}",
            self.uploads,
            stamp.format("%Y%m%d_%H%M%S"),
            short_id,
            stem,
            ext
        )
    }
}
