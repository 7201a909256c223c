//! In-memory object store.
//!
//! Used for tests and for embedding the pipeline without a storage backend.
//! Keeps every version ever written to a key so callers can inspect the
//! sequence of status records a job went through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::object_store::{
    compute_etag, validate_key, ObjectStore, Precondition, PresignedPost, PresignedUrl,
    StoreError, StoredObject,
};
use super::signing::GrantSigner;

/// Object store backed by a `HashMap`
pub struct MemoryObjectStore {
    signer: Arc<GrantSigner>,
    objects: RwLock<HashMap<String, StoredObject>>,
    history: Mutex<Vec<(String, Vec<u8>)>>,
    failing_prefixes: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(signer: Arc<GrantSigner>) -> Self {
        Self {
            signer,
            objects: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            failing_prefixes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every later write under `prefix` fail
    pub fn fail_writes_under(&self, prefix: impl Into<String>) {
        if let Ok(mut prefixes) = self.failing_prefixes.lock() {
            prefixes.push(prefix.into());
        }
    }

    /// Number of operations (reads, writes, grants) served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every body successfully written to `key`, oldest first
    pub fn versions(&self, key: &str) -> Vec<Vec<u8>> {
        self.history
            .lock()
            .map(|h| {
                h.iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn write_fails(&self, key: &str) -> bool {
        self.failing_prefixes
            .lock()
            .map(|p| p.iter().any(|prefix| key.starts_with(prefix.as_str())))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
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
        self.record_call();
        validate_key(key)?;

        if self.write_fails(key) {
            return Err(StoreError::Unavailable(format!("injected failure for {}", key)));
        }

        let mut objects = self.objects.write().await;
        let current = objects.get(key).map(|o| o.etag.as_str());
        let allowed = match &precondition {
            Precondition::None => true,
            Precondition::DoesNotExist => current.is_none(),
            Precondition::Matches(etag) => current == Some(etag.as_str()),
        };
        if !allowed {
            return Err(StoreError::PreconditionFailed(key.to_string()));
        }

        let etag = compute_etag(&body);
        if let Ok(mut history) = self.history.lock() {
            history.push((key.to_string(), body.clone()));
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                etag: etag.clone(),
            },
        );

        Ok(etag)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.record_call();
        validate_key(key)?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.record_call();
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StoreError> {
        self.record_call();
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
        self.record_call();
        validate_key(key)?;
        Ok(self
            .signer
            .sign_post(key, content_type, max_bytes, ttl, Utc::now())?)
    }
}
