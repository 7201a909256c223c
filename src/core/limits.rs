//! Upload limits and input validation.
//!
//! Rejects bad client input before anything touches the object store:
//! - File size ceiling
//! - File name length and character whitelist
//! - Audio content-type whitelist

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters accepted in client-supplied file names
static SAFE_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._\- ()]+$").unwrap());

/// Limits applied to upload requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Maximum file size in bytes (default: 20MB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Maximum file name length in characters (default: 100)
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,

    /// Accepted content types and the extension used for each
    #[serde(default = "default_allowed_types")]
    pub allowed_types: BTreeMap<String, String>,
}

fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
} // 20MB
fn default_max_name_len() -> usize {
    100
}

fn default_allowed_types() -> BTreeMap<String, String> {
    [
        ("audio/mpeg", "mp3"),
        ("audio/mp3", "mp3"),
        ("audio/wav", "wav"),
        ("audio/vnd.wave", "wav"),
        ("audio/wave", "wav"),
        ("audio/x-wav", "wav"),
        ("audio/mp4", "m4a"),
        ("audio/x-m4a", "m4a"),
        ("audio/m4a", "m4a"),
        ("audio/aac", "aac"),
        ("audio/ogg", "ogg"),
        ("audio/flac", "flac"),
        ("audio/webm", "webm"),
        ("audio/opus", "opus"),
        ("audio/x-ms-wma", "wma"),
        ("audio/3gpp", "3gp"),
        ("audio/amr", "amr"),
        ("audio/x-aiff", "aiff"),
        ("audio/aiff", "aiff"),
    ]
    .into_iter()
    .map(|(mime, ext)| (mime.to_string(), ext.to_string()))
    .collect()
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_name_len: default_max_name_len(),
            allowed_types: default_allowed_types(),
        }
    }
}

impl UploadLimits {
    /// Validate an upload request against all limits
    pub fn validate(
        &self,
        file_name: &str,
        content_type: &str,
        file_size: u64,
    ) -> Result<(), ValidationError> {
        let name_len = file_name.chars().count();
        if name_len == 0 || name_len > self.max_name_len {
            return Err(ValidationError::InvalidFileName {
                limit: self.max_name_len,
            });
        }

        if !SAFE_FILE_NAME.is_match(file_name) {
            return Err(ValidationError::UnsafeFileName);
        }

        if !self.allowed_types.contains_key(content_type) {
            return Err(ValidationError::DisallowedType(content_type.to_string()));
        }

        if file_size > self.max_file_bytes {
            return Err(ValidationError::TooLarge {
                actual: file_size,
                limit: self.max_file_bytes,
            });
        }

        Ok(())
    }

    /// Extension for an accepted content type
    pub fn extension_for(&self, content_type: &str) -> Option<&str> {
        self.allowed_types.get(content_type).map(String::as_str)
    }
}

/// Replace every character outside the whitelist with `_`
pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '(' | ')' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Bad client input; raised before any state is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid file name: must be 1 to {limit} characters")]
    InvalidFileName { limit: usize },

    #[error("File name contains characters that are not allowed")]
    UnsafeFileName,

    #[error("Only audio files are allowed (got '{0}')")]
    DisallowedType(String),

    #[error("File too large: {actual} bytes exceeds the {limit} byte limit")]
    TooLarge { actual: u64, limit: u64 },

    #[error("Malformed object key: {0}")]
    MalformedKey(String),

    #[error("Malformed trigger event: {0}")]
    MalformedEvent(String),
}
