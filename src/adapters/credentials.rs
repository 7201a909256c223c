//! API credentials for the transcription and analysis services.
//!
//! Credentials are fetched once per job run, never cached across runs, so a
//! rotated secret takes effect on the next upload.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Default names of the two keys inside the secret document
pub const TRANSCRIPTION_KEY_NAME: &str = "ASSEMBLYAI_API_KEY";
pub const ANALYSIS_KEY_NAME: &str = "ANTHROPIC_API_KEY";

/// Credential errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed secret document: {0}")]
    Malformed(String),

    #[error("API key not found in secrets: {0}")]
    MissingKey(String),
}

/// Keys for the two external services
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub transcription_key: String,
    pub analysis_key: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("transcription_key", &"<redacted>")
            .field("analysis_key", &"<redacted>")
            .finish()
    }
}

/// Source of API credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn fetch(&self) -> Result<ApiCredentials, CredentialError>;
}

/// Pull both keys out of a JSON secret document
fn credentials_from_secret(
    secret: &str,
    transcription_name: &str,
    analysis_name: &str,
) -> Result<ApiCredentials, CredentialError> {
    let doc: Value =
        serde_json::from_str(secret).map_err(|e| CredentialError::Malformed(e.to_string()))?;

    let key = |name: &str| {
        doc.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CredentialError::MissingKey(name.to_string()))
    };

    Ok(ApiCredentials {
        transcription_key: key(transcription_name)?,
        analysis_key: key(analysis_name)?,
    })
}

/// Secret document stored as a JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
    transcription_name: String,
    analysis_name: String,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transcription_name: TRANSCRIPTION_KEY_NAME.to_string(),
            analysis_name: ANALYSIS_KEY_NAME.to_string(),
        }
    }

    /// Override the key names looked up in the document
    pub fn with_key_names(
        mut self,
        transcription_name: impl Into<String>,
        analysis_name: impl Into<String>,
    ) -> Self {
        self.transcription_name = transcription_name.into();
        self.analysis_name = analysis_name.into();
        self
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn fetch(&self) -> Result<ApiCredentials, CredentialError> {
        let secret = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CredentialError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        credentials_from_secret(&secret, &self.transcription_name, &self.analysis_name)
    }
}

/// Keys read from environment variables of the same names
#[derive(Debug, Clone)]
pub struct EnvCredentialStore {
    transcription_var: String,
    analysis_var: String,
}

impl EnvCredentialStore {
    pub fn new(transcription_var: impl Into<String>, analysis_var: impl Into<String>) -> Self {
        Self {
            transcription_var: transcription_var.into(),
            analysis_var: analysis_var.into(),
        }
    }
}

impl Default for EnvCredentialStore {
    fn default() -> Self {
        Self::new(TRANSCRIPTION_KEY_NAME, ANALYSIS_KEY_NAME)
    }
}

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn fetch(&self) -> Result<ApiCredentials, CredentialError> {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CredentialError::MissingKey(name.to_string()))
        };
        Ok(ApiCredentials {
            transcription_key: var(&self.transcription_var)?,
            analysis_key: var(&self.analysis_var)?,
        })
    }
}

/// Fixed keys, for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub ApiCredentials);

impl StaticCredentials {
    pub fn new(transcription_key: impl Into<String>, analysis_key: impl Into<String>) -> Self {
        Self(ApiCredentials {
            transcription_key: transcription_key.into(),
            analysis_key: analysis_key.into(),
        })
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn fetch(&self) -> Result<ApiCredentials, CredentialError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_secret_document() {
        let creds = credentials_from_secret(
            r#"{"ASSEMBLYAI_API_KEY": "aai", "ANTHROPIC_API_KEY": "ant", "OTHER": 1}"#,
            TRANSCRIPTION_KEY_NAME,
            ANALYSIS_KEY_NAME,
        )
        .unwrap();
        assert_eq!(creds.transcription_key, "aai");
        assert_eq!(creds.analysis_key, "ant");
    }

    #[test]
    fn test_missing_or_empty_key() {
        let err = credentials_from_secret(
            r#"{"ASSEMBLYAI_API_KEY": "aai", "ANTHROPIC_API_KEY": "  "}"#,
            TRANSCRIPTION_KEY_NAME,
            ANALYSIS_KEY_NAME,
        )
        .unwrap_err();
        assert!(matches!(err, CredentialError::MissingKey(name) if name == ANALYSIS_KEY_NAME));

        let err = credentials_from_secret("not json", TRANSCRIPTION_KEY_NAME, ANALYSIS_KEY_NAME)
            .unwrap_err();
        assert!(matches!(err, CredentialError::Malformed(_)));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let creds = StaticCredentials::new("secret-a", "secret-b").0;
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("secret-a"));
        assert!(!shown.contains("secret-b"));
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"STT": "a", "LLM": "b"}"#).unwrap();

        let creds = FileCredentialStore::new(&path)
            .with_key_names("STT", "LLM")
            .fetch()
            .await
            .unwrap();
        assert_eq!(creds.transcription_key, "a");
        assert_eq!(creds.analysis_key, "b");

        let missing = FileCredentialStore::new(dir.path().join("nope.json"))
            .fetch()
            .await;
        assert!(matches!(missing, Err(CredentialError::Unavailable(_))));
    }
}
