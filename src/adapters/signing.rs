//! Signing and verification of object store access grants.
//!
//! Read grants are URLs carrying `expires` and `signature` query parameters.
//! Upload grants carry a base64 policy (bucket, key, content type, size range,
//! expiry) plus its signature as form fields. Signatures are HMAC-SHA256 over
//! the canonical request, keyed with the store's signing key.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use super::object_store::{PresignedPost, PresignedUrl};

type HmacSha256 = Hmac<Sha256>;

/// Form field names of an upload grant
pub const FIELD_KEY: &str = "key";
pub const FIELD_CONTENT_TYPE: &str = "Content-Type";
pub const FIELD_POLICY: &str = "policy";
pub const FIELD_SIGNATURE: &str = "signature";

/// Grant errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    #[error("grant expired")]
    Expired,

    #[error("signature does not match")]
    BadSignature,

    #[error("malformed grant: {0}")]
    Malformed(String),

    #[error("upload violates grant policy: {0}")]
    PolicyViolation(String),
}

/// Conditions signed into an upload grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub min_bytes: u64,
    pub max_bytes: u64,
    /// Unix seconds
    pub expires: i64,
}

/// Mints and checks grants for one bucket
#[derive(Clone)]
pub struct GrantSigner {
    secret: Vec<u8>,
    base_url: Url,
    bucket: String,
}

impl std::fmt::Debug for GrantSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantSigner")
            .field("base_url", &self.base_url.as_str())
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl GrantSigner {
    /// Create a signer for grants served under `base_url`
    pub fn new(
        secret: impl Into<Vec<u8>>,
        base_url: &str,
        bucket: impl Into<String>,
    ) -> Result<Self, GrantError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GrantError::Malformed(format!("base url '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(GrantError::Malformed(format!("base url '{}'", base_url)));
        }

        Ok(Self {
            secret: secret.into(),
            base_url,
            bucket: bucket.into(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Mint a read URL for `key`
    pub fn sign_get(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<PresignedUrl, GrantError> {
        let expires_at = expiry(now, ttl)?;
        let expires = expires_at.timestamp();
        let signature = self.mac_hex(&self.get_payload(key, expires))?;

        let mut url = self.object_url(key)?;
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);

        Ok(PresignedUrl {
            url: url.to_string(),
            expires_at,
        })
    }

    /// Check a read grant presented for `key`
    pub fn verify_get(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GrantError> {
        self.verify_mac(&self.get_payload(key, expires), signature)?;
        if now.timestamp() > expires {
            return Err(GrantError::Expired);
        }
        Ok(())
    }

    /// Mint an upload grant for exactly one key
    pub fn sign_post(
        &self,
        key: &str,
        content_type: &str,
        max_bytes: u64,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<PresignedPost, GrantError> {
        let expires_at = expiry(now, ttl)?;
        let policy = UploadPolicy {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            min_bytes: 1,
            max_bytes,
            expires: expires_at.timestamp(),
        };
        let policy_json =
            serde_json::to_vec(&policy).map_err(|e| GrantError::Malformed(e.to_string()))?;
        let encoded = BASE64.encode(policy_json);
        let signature = self.mac_hex(encoded.as_bytes())?;

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GrantError::Malformed("base url".to_string()))?
            .pop_if_empty()
            .push("objects");

        let fields = BTreeMap::from([
            (FIELD_KEY.to_string(), key.to_string()),
            (FIELD_CONTENT_TYPE.to_string(), content_type.to_string()),
            (FIELD_POLICY.to_string(), encoded),
            (FIELD_SIGNATURE.to_string(), signature),
        ]);

        Ok(PresignedPost {
            url: url.to_string(),
            fields,
            expires_at,
        })
    }

    /// Check the form fields and body size of an upload against its grant.
    ///
    /// Returns the verified policy; its key is where the body goes.
    pub fn verify_post(
        &self,
        fields: &HashMap<String, String>,
        body_len: u64,
        now: DateTime<Utc>,
    ) -> Result<UploadPolicy, GrantError> {
        let field = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| GrantError::Malformed(format!("missing field '{}'", name)))
        };

        let encoded = field(FIELD_POLICY)?;
        self.verify_mac(encoded.as_bytes(), field(FIELD_SIGNATURE)?)?;

        let policy_json = BASE64
            .decode(encoded)
            .map_err(|e| GrantError::Malformed(format!("policy encoding: {}", e)))?;
        let policy: UploadPolicy = serde_json::from_slice(&policy_json)
            .map_err(|e| GrantError::Malformed(format!("policy: {}", e)))?;

        if now.timestamp() > policy.expires {
            return Err(GrantError::Expired);
        }
        if policy.bucket != self.bucket {
            return Err(GrantError::PolicyViolation("bucket".to_string()));
        }
        if field(FIELD_KEY)? != &policy.key {
            return Err(GrantError::PolicyViolation("key".to_string()));
        }
        let content_type = field(FIELD_CONTENT_TYPE)?;
        if content_type != &policy.content_type || !content_type.starts_with("audio/") {
            return Err(GrantError::PolicyViolation("Content-Type".to_string()));
        }
        if body_len < policy.min_bytes || body_len > policy.max_bytes {
            return Err(GrantError::PolicyViolation(format!(
                "content length {} outside {}..={}",
                body_len, policy.min_bytes, policy.max_bytes
            )));
        }

        Ok(policy)
    }

    fn object_url(&self, key: &str) -> Result<Url, GrantError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GrantError::Malformed("base url".to_string()))?;
            segments.pop_if_empty().push("objects");
            for part in key.split('/') {
                segments.push(part);
            }
        }
        Ok(url)
    }

    fn get_payload(&self, key: &str, expires: i64) -> Vec<u8> {
        format!("GET\n{}\n{}\n{}", self.bucket, key, expires).into_bytes()
    }

    fn mac(&self) -> Result<HmacSha256, GrantError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| GrantError::Malformed("signing key".to_string()))
    }

    fn mac_hex(&self, payload: &[u8]) -> Result<String, GrantError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify_mac(&self, payload: &[u8], signature: &str) -> Result<(), GrantError> {
        let expected = hex::decode(signature).map_err(|_| GrantError::BadSignature)?;
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| GrantError::BadSignature)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, GrantError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| GrantError::Malformed(format!("ttl {:?}", ttl)))
}
