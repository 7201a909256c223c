//! Configuration for voxpipe.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VOXPIPE_HOME, VOXPIPE_BUCKET, VOXPIPE_BIND,
//!    VOXPIPE_PUBLIC_URL, VOXPIPE_SIGNING_KEY, VOXPIPE_SECRETS_FILE)
//! 2. Config file (.voxpipe/config.yaml)
//! 3. Defaults (~/.voxpipe)
//!
//! Config file discovery:
//! - Searches current directory and parents for .voxpipe/config.yaml
//! - Paths in the config file are relative to the .voxpipe/ directory
//!
//! Each section is handed to the component that uses it; nothing here is
//! read through a global.

pub mod namespaces;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::credentials::{ANALYSIS_KEY_NAME, TRANSCRIPTION_KEY_NAME};
use crate::adapters::{AnalysisSettings, TranscriptionSettings};
use crate::core::UploadLimits;

pub use namespaces::Namespaces;

const CONFIG_DIR: &str = ".voxpipe";
const SIGNING_KEY_FILE: &str = "signing.key";
const DEFAULT_BUCKET: &str = "media";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    /// State directory (relative to .voxpipe/)
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub namespaces: Namespaces,
    #[serde(default)]
    pub upload: UploadLimits,
    #[serde(default)]
    pub grants: GrantTtls,
    #[serde(default)]
    pub transcription: TranscriptionSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub jobs: JobSettings,
    #[serde(default)]
    pub credentials: CredentialSettings,
}

/// HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listen address (default: 0.0.0.0:9000)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Base URL clients reach the server at; grant URLs are built on it
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Grant signing key; generated under the home directory when unset
    #[serde(default, skip_serializing)]
    pub signing_key: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:9000".to_string()
}
fn default_public_url() -> String {
    "http://localhost:9000".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
            signing_key: None,
        }
    }
}

/// Lifetimes of access grants, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantTtls {
    /// Upload write grant (default: 3600)
    #[serde(default = "default_upload_ttl")]
    pub upload_seconds: u64,

    /// Audio read grant handed to the transcription service (default: 900)
    #[serde(default = "default_audio_read_ttl")]
    pub audio_read_seconds: u64,

    /// Result download URLs (default: 300)
    #[serde(default = "default_result_read_ttl")]
    pub result_read_seconds: u64,
}

fn default_upload_ttl() -> u64 {
    3600
}
fn default_audio_read_ttl() -> u64 {
    900
}
fn default_result_read_ttl() -> u64 {
    300
}

impl Default for GrantTtls {
    fn default() -> Self {
        Self {
            upload_seconds: default_upload_ttl(),
            audio_read_seconds: default_audio_read_ttl(),
            result_read_seconds: default_result_read_ttl(),
        }
    }
}

impl GrantTtls {
    pub fn upload(&self) -> Duration {
        Duration::from_secs(self.upload_seconds)
    }

    pub fn audio_read(&self) -> Duration {
        Duration::from_secs(self.audio_read_seconds)
    }

    pub fn result_read(&self) -> Duration {
        Duration::from_secs(self.result_read_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// A non-terminal job silent for this long counts as stalled (default: 1800)
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
}

fn default_stale_after() -> u64 {
    1800
} // 30 minutes

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            stale_after_seconds: default_stale_after(),
        }
    }
}

impl JobSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }
}

/// Where API keys come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// JSON secret document (default: {home}/secrets.json)
    #[serde(default)]
    pub secrets_file: Option<PathBuf>,

    #[serde(default = "default_transcription_key_name")]
    pub transcription_key_name: String,

    #[serde(default = "default_analysis_key_name")]
    pub analysis_key_name: String,

    /// Read the keys from environment variables named after the key names
    #[serde(default)]
    pub from_env: bool,
}

fn default_transcription_key_name() -> String {
    TRANSCRIPTION_KEY_NAME.to_string()
}
fn default_analysis_key_name() -> String {
    ANALYSIS_KEY_NAME.to_string()
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            secrets_file: None,
            transcription_key_name: default_transcription_key_name(),
            analysis_key_name: default_analysis_key_name(),
            from_env: false,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// State directory (buckets, signing key, secrets)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Bucket served by this instance
    pub bucket: String,
    pub server: ServerSettings,
    pub namespaces: Namespaces,
    pub upload: UploadLimits,
    pub grants: GrantTtls,
    pub transcription: TranscriptionSettings,
    pub analysis: AnalysisSettings,
    pub jobs: JobSettings,
    pub credentials: CredentialSettings,
}

impl Settings {
    /// Default settings with state under `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_file: None,
            bucket: DEFAULT_BUCKET.to_string(),
            server: ServerSettings::default(),
            namespaces: Namespaces::default(),
            upload: UploadLimits::default(),
            grants: GrantTtls::default(),
            transcription: TranscriptionSettings::default(),
            analysis: AnalysisSettings::default(),
            jobs: JobSettings::default(),
            credentials: CredentialSettings::default(),
        }
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_file = find_config_file();
        let file = match &config_file {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        resolve(file, config_file, |name| std::env::var(name).ok())
    }

    /// Directory holding the objects of the served bucket
    pub fn bucket_root(&self) -> PathBuf {
        self.home.join("buckets").join(&self.bucket)
    }

    /// Location of the JSON secret document
    pub fn secrets_file(&self) -> PathBuf {
        self.credentials
            .secrets_file
            .clone()
            .unwrap_or_else(|| self.home.join("secrets.json"))
    }

    /// Grant signing key, created on first use when not configured
    pub fn signing_key(&self) -> Result<Vec<u8>> {
        if let Some(key) = &self.server.signing_key {
            return Ok(key.as_bytes().to_vec());
        }

        let path = self.home.join(SIGNING_KEY_FILE);
        if path.exists() {
            let hex_key = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read signing key: {}", path.display()))?;
            return hex::decode(hex_key.trim())
                .with_context(|| format!("Signing key is not hex: {}", path.display()));
        }

        std::fs::create_dir_all(&self.home)
            .with_context(|| format!("Failed to create {}", self.home.display()))?;
        let key: Vec<u8> = [uuid::Uuid::new_v4(), uuid::Uuid::new_v4()]
            .iter()
            .flat_map(|id| id.as_bytes().to_vec())
            .collect();
        std::fs::write(&path, hex::encode(&key))
            .with_context(|| format!("Failed to write signing key: {}", path.display()))?;
        Ok(key)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine a parsed config file with environment overrides
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = if let Some(env_home) = env("VOXPIPE_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home), Some(dir)) = (&file.home, &config_dir) {
        resolve_path(dir, home)
    } else {
        dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(CONFIG_DIR)
    };

    let mut server = file.server;
    if let Some(bind) = env("VOXPIPE_BIND") {
        server.bind = bind;
    }
    if let Some(url) = env("VOXPIPE_PUBLIC_URL") {
        server.public_url = url;
    }
    if let Some(key) = env("VOXPIPE_SIGNING_KEY") {
        server.signing_key = Some(key);
    }

    let mut credentials = file.credentials;
    if let Some(path) = env("VOXPIPE_SECRETS_FILE") {
        credentials.secrets_file = Some(PathBuf::from(path));
    } else if let (Some(path), Some(dir)) = (&credentials.secrets_file, &config_dir) {
        credentials.secrets_file = Some(resolve_path(dir, &path.to_string_lossy()));
    }

    let bucket = env("VOXPIPE_BUCKET")
        .or(file.bucket)
        .unwrap_or_else(|| DEFAULT_BUCKET.to_string());

    Ok(Settings {
        home,
        config_file,
        bucket,
        server,
        namespaces: file.namespaces,
        upload: file.upload,
        grants: file.grants,
        transcription: file.transcription,
        analysis: file.analysis,
        jobs: file.jobs,
        credentials,
    })
}
