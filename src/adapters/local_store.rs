//! Directory-backed object store.
//!
//! Layout under the bucket root:
//! ```text
//! {root}/
//! ├── uploads/...            # objects, one file per key
//! ├── processing/...
//! ├── results/...
//! └── .meta/{key}.json       # content type of each object
//! ```
//!
//! Writes go to a temp file that is renamed into place, so readers never see
//! a partial object. Conditional writes are serialized by an in-process lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::object_store::{
    compute_etag, validate_key, ObjectStore, Precondition, PresignedPost, PresignedUrl,
    StoreError, StoredObject,
};
use super::signing::GrantSigner;

const META_DIR: &str = ".meta";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
}

/// Object store rooted at a local directory
pub struct LocalObjectStore {
    root: PathBuf,
    signer: Arc<GrantSigner>,
    write_lock: Mutex<()>,
}

impl LocalObjectStore {
    /// Open (and create if needed) the bucket directory
    pub async fn open(root: impl Into<PathBuf>, signer: Arc<GrantSigner>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(META_DIR)).await?;
        Ok(Self {
            root,
            signer,
            write_lock: Mutex::new(()),
        })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{}.json", key))
    }

    async fn current_etag(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read(self.object_path(key)).await {
            Ok(body) => Ok(Some(compute_etag(&body))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn content_type(&self, key: &str) -> String {
        let Ok(bytes) = fs::read(self.meta_path(key)).await else {
            return DEFAULT_CONTENT_TYPE.to_string();
        };
        serde_json::from_slice::<ObjectMeta>(&bytes)
            .map(|m| m.content_type)
            .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string())
    }
}

/// Write `bytes` next to `path` and rename over it
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        self.signer.bucket()
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        precondition: Precondition,
    ) -> Result<String, StoreError> {
        validate_key(key)?;
        let _guard = self.write_lock.lock().await;

        let allowed = match &precondition {
            Precondition::None => true,
            Precondition::DoesNotExist => self.current_etag(key).await?.is_none(),
            Precondition::Matches(etag) => {
                self.current_etag(key).await?.as_deref() == Some(etag.as_str())
            }
        };
        if !allowed {
            return Err(StoreError::PreconditionFailed(key.to_string()));
        }

        let etag = compute_etag(&body);
        write_atomic(&self.object_path(key), &body).await?;

        let meta = serde_json::to_vec(&ObjectMeta {
            content_type: content_type.to_string(),
        })?;
        write_atomic(&self.meta_path(key), &meta).await?;

        debug!(key, %etag, bytes = body.len(), "Stored object");
        Ok(etag)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        validate_key(key)?;
        let body = match fs::read(self.object_path(key)).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredObject {
            etag: compute_etag(&body),
            content_type: self.content_type(key).await,
            body,
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let path = self.object_path(key);
        Ok(fs::try_exists(&path).await? && fs::metadata(&path).await?.is_file())
    }

    fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StoreError> {
        validate_key(key)?;
        Ok(self.signer.sign_get(key, ttl, Utc::now())?)
    }

    fn presign_post(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
    ) -> Result<PresignedPost, StoreError> {
        validate_key(key)?;
        Ok(self
            .signer
            .sign_post(key, content_type, max_bytes, ttl, Utc::now())?)
    }
}
