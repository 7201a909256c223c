//! Object store interface.
//!
//! A bucket of blobs addressed by hierarchical keys, with conditional writes
//! and time-boxed access grants that let clients read or write one object
//! directly without routing bytes through the service.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::signing::GrantError;

/// A stored object
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    /// Opaque version token, changes on every write
    pub etag: String,
}

/// Condition a write must satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite
    None,
    /// Fail if the key already exists
    DoesNotExist,
    /// Fail unless the current version has this etag
    Matches(String),
}

/// Time-boxed read grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Time-boxed write grant for a form upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedPost {
    /// Form action
    pub url: String,
    /// Fields the client must send along with the file
    pub fields: BTreeMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Precondition failed for {0}")]
    PreconditionFailed(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Grant error: {0}")]
    Grant(#[from] GrantError),
}

/// Blob storage used for uploads, status records and results
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket this store addresses
    fn bucket(&self) -> &str;

    /// Write an object, returning its new etag
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        precondition: Precondition,
    ) -> Result<String, StoreError>;

    /// Read an object (`None` when absent)
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Existence check without reading the body
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Mint a read grant for one key
    fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StoreError>;

    /// Mint a form-upload grant for one key, bound to a content type and size
    fn presign_post(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<PresignedPost, StoreError>;
}

/// Reject keys that could escape the bucket or collide with store metadata
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        || key.starts_with(".meta/");

    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Version token of a body (first 16 hex chars of its SHA-256)
pub fn compute_etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(&digest[..8])
}
