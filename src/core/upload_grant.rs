//! Upload grant issuer.
//!
//! Validates a client's upload request and, only then, mints a write grant
//! for a key the issuer chooses itself:
//! `{uploads}{YYYYMMDD_HHMMSS}_{8 hex chars}_{sanitized name}.{ext}`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use super::limits::{sanitize_file_name, UploadLimits, ValidationError};
use crate::adapters::{ObjectStore, StoreError};
use crate::config::Namespaces;

/// Client request for an upload grant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub file_name: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    /// Declared size in bytes
    #[serde(default)]
    pub file_size: u64,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            file_size,
        }
    }
}

/// A write grant for one upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadGrant {
    pub success: bool,

    /// Form action the client posts to
    pub upload_url: String,

    /// Form fields the client must send with the file
    pub fields: BTreeMap<String, String>,

    /// Key the upload will land at; also the key to poll status with
    pub file_key: String,

    pub expires_at: DateTime<Utc>,
}

/// Upload grant errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues upload grants
pub struct UploadGrantIssuer {
    store: Arc<dyn ObjectStore>,
    limits: UploadLimits,
    namespaces: Namespaces,
    ttl: Duration,
}

impl UploadGrantIssuer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        limits: UploadLimits,
        namespaces: Namespaces,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            limits,
            namespaces,
            ttl,
        }
    }

    /// Validate the request and mint a grant for a fresh key
    #[instrument(skip(self, request), fields(file_name = ?request.file_name))]
    pub fn issue(&self, request: &UploadRequest) -> Result<UploadGrant, UploadError> {
        let file_name = non_empty(request.file_name.as_deref())
            .ok_or(ValidationError::MissingField("file_name"))?;
        let content_type = non_empty(request.content_type.as_deref())
            .ok_or(ValidationError::MissingField("content_type"))?;

        self.limits
            .validate(file_name, content_type, request.file_size)?;

        let key = self.destination_key(file_name, content_type, Utc::now())?;
        let post = self
            .store
            .presign_post(&key, content_type, self.limits.max_file_bytes, self.ttl)?;

        info!(file_key = %key, content_type, "Issued upload grant");

        Ok(UploadGrant {
            success: true,
            upload_url: post.url,
            fields: post.fields,
            file_key: key,
            expires_at: post.expires_at,
        })
    }

    fn destination_key(
        &self,
        file_name: &str,
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ValidationError> {
        let ext = self
            .limits
            .extension_for(content_type)
            .ok_or_else(|| ValidationError::DisallowedType(content_type.to_string()))?;

        let mut stem = sanitize_file_name(file_name);
        let suffix = format!(".{}", ext);
        if stem.to_lowercase().ends_with(&suffix) {
            stem.truncate(stem.len() - suffix.len());
        }

        let short_id = uuid::Uuid::new_v4().simple().to_string();
        Ok(self
            .namespaces
            .upload_key(now, &short_id[..8], &stem, ext))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
