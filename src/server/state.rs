use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::adapters::{
    AnalysisClient, AnthropicClient, AssemblyAiClient, CredentialStore, EnvCredentialStore,
    FileCredentialStore, GrantSigner, LocalObjectStore, ObjectStore, TranscriptionClient,
};
use crate::config::Settings;
use crate::core::{IntakeHandler, StatusQueryHandler, UploadGrantIssuer};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub signer: Arc<GrantSigner>,
    pub uploads: Arc<UploadGrantIssuer>,
    pub intake: Arc<IntakeHandler>,
    pub status: Arc<StatusQueryHandler>,
    /// Largest upload body accepted on `/objects`
    pub max_upload_bytes: u64,
    /// Intake runs started by `/events` and `/objects`
    pub jobs: BackgroundJobs,
}

/// Intake runs detached from the request that started them.
///
/// Tasks stay tracked until they finish so shutdown can wait for them
/// instead of dropping a job halfway through its status records.
#[derive(Clone, Default)]
pub struct BackgroundJobs {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundJobs {
    /// Start `job` on the runtime. Must be called from within a Tokio runtime.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        // Reap finished runs so the set only holds live ones
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "Background job did not finish cleanly");
            }
        }
        tasks.spawn(job);
    }

    /// Runs not yet reaped
    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every tracked run to finish
    pub async fn drain(&self) {
        loop {
            let mut pending = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                return;
            }
            info!(pending = pending.len(), "Waiting for background jobs");
            while let Some(finished) = pending.join_next().await {
                if let Err(e) = finished {
                    warn!(error = %e, "Background job did not finish cleanly");
                }
            }
        }
    }
}

impl AppState {
    /// Wire the handlers around the given collaborators
    pub fn new(
        settings: &Settings,
        signer: Arc<GrantSigner>,
        store: Arc<dyn ObjectStore>,
        credentials: Arc<dyn CredentialStore>,
        transcriber: Arc<dyn TranscriptionClient>,
        analyzer: Arc<dyn AnalysisClient>,
    ) -> Self {
        let uploads = UploadGrantIssuer::new(
            store.clone(),
            settings.upload.clone(),
            settings.namespaces.clone(),
            settings.grants.upload(),
        );
        let intake = IntakeHandler::new(
            store.clone(),
            settings.namespaces.clone(),
            credentials,
            transcriber,
            analyzer,
        )
        .with_audio_grant_ttl(settings.grants.audio_read())
        .with_stale_after(settings.jobs.stale_after());
        let status = StatusQueryHandler::new(store.clone(), settings.namespaces.clone())
            .with_result_grant_ttl(settings.grants.result_read())
            .with_stale_after(settings.jobs.stale_after());

        Self {
            store,
            signer,
            uploads: Arc::new(uploads),
            intake: Arc::new(intake),
            status: Arc::new(status),
            max_upload_bytes: settings.upload.max_file_bytes,
            jobs: BackgroundJobs::default(),
        }
    }

    /// Production wiring: local bucket, secret file, AssemblyAI and Anthropic
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let signer = Arc::new(
            GrantSigner::new(
                settings.signing_key()?,
                &settings.server.public_url,
                settings.bucket.clone(),
            )
            .context("Invalid public URL")?,
        );
        let store = LocalObjectStore::open(settings.bucket_root(), signer.clone())
            .await
            .with_context(|| format!("Failed to open bucket at {}", settings.bucket_root().display()))?;
        let names = &settings.credentials;
        let credentials: Arc<dyn CredentialStore> = if names.from_env {
            Arc::new(EnvCredentialStore::new(
                &names.transcription_key_name,
                &names.analysis_key_name,
            ))
        } else {
            Arc::new(
                FileCredentialStore::new(settings.secrets_file())
                    .with_key_names(&names.transcription_key_name, &names.analysis_key_name),
            )
        };

        Ok(Self::new(
            settings,
            signer,
            Arc::new(store),
            credentials,
            Arc::new(AssemblyAiClient::new(settings.transcription.clone())),
            Arc::new(AnthropicClient::new(settings.analysis.clone())),
        ))
    }
}
