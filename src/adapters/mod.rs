//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface for the services a job depends on:
//! - Object store (uploads, status records, results)
//! - Credential store (API keys)
//! - Speech-to-text service
//! - Language model used for content analysis

pub mod anthropic;
pub mod assemblyai;
pub mod credentials;
pub mod local_store;
pub mod memory_store;
pub mod object_store;
pub mod signing;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Analysis, Transcription};

pub use anthropic::{AnalysisSettings, AnthropicClient};
pub use assemblyai::{AssemblyAiClient, TranscriptionSettings};
pub use credentials::{
    ApiCredentials, CredentialError, CredentialStore, EnvCredentialStore, FileCredentialStore,
    StaticCredentials,
};
pub use local_store::LocalObjectStore;
pub use memory_store::MemoryObjectStore;
pub use object_store::{
    ObjectStore, Precondition, PresignedPost, PresignedUrl, StoreError, StoredObject,
};
pub use signing::{GrantError, GrantSigner, UploadPolicy};

/// Speech-to-text failures
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Transcription provider error: {0}")]
    Provider(String),

    #[error("Transcription returned no text")]
    EmptyTranscript,

    #[error("Transcription did not finish within {0} seconds")]
    Timeout(u64),

    #[error("Transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected transcription response: {0}")]
    Parse(String),
}

/// Language model failures (an unparseable reply is not one of them)
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis provider error: {0}")]
    Provider(String),

    #[error("Analysis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected analysis response: {0}")]
    Parse(String),
}

/// Trait for speech-to-text services
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Human-readable service name
    fn name(&self) -> &str;

    /// Transcribe the audio behind a readable URL
    async fn transcribe(
        &self,
        audio_url: &str,
        api_key: &str,
    ) -> Result<Transcription, TranscriptionError>;
}

/// Trait for transcript analysis services
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Human-readable service name
    fn name(&self) -> &str;

    /// Analyze transcript text.
    ///
    /// A reply that is not the expected JSON yields a degraded [`Analysis`],
    /// not an error.
    async fn analyze(&self, transcript: &str, api_key: &str) -> Result<Analysis, AnalysisError>;
}
