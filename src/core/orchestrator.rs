//! Intake handler: runs the pipeline for a newly uploaded object.
//!
//! One invocation per trigger, strictly sequential:
//! claim (STARTING) → credentials → audio read grant → TRANSCRIBING →
//! TRANSCRIPTION_COMPLETED → ANALYZING → persist artifacts → COMPLETED.
//!
//! Every failure after the claim is caught once at the top, recorded as a
//! best-effort ERROR status and returned as a `Failed` outcome. There are no
//! internal retries; a redelivered trigger for a failed job runs it again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::adapters::{
    AnalysisClient, AnalysisError, CredentialError, CredentialStore, ObjectStore, Precondition,
    StoreError, TranscriptionClient, TranscriptionError,
};
use crate::config::Namespaces;
use crate::domain::{
    round_seconds, ArtifactKeys, JobId, PipelineResult, ResultMetadata, Stage, StatusRecord,
};

use super::limits::ValidationError;
use super::status_store::JobStatusStore;
use super::trigger::{parse_trigger, ObjectCreated};

const JSON: &str = "application/json";

/// Longest prefix of a grant URL that may appear in logs
const LOGGED_URL_CHARS: usize = 100;

/// Failures that end a job in ERROR
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Credentials unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("Could not grant read access to the audio: {0}")]
    AudioGrant(#[source] StoreError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Failed to persist {key}: {source}")]
    Persistence {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },
}

/// Result of handling one created object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
    /// Not an upload this service processes
    Ignored { file_key: String, reason: String },

    /// The job is done or owned by another run
    Duplicate { job_id: JobId, reason: String },

    Completed {
        job_id: JobId,
        result_key: String,
        transcript_key: String,
        elapsed_seconds: f64,
    },

    Failed { job_id: Option<JobId>, error: String },
}

impl IntakeOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            IntakeOutcome::Failed { .. } => 500,
            _ => 200,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            IntakeOutcome::Ignored { reason, .. } => json!({ "message": reason }),
            IntakeOutcome::Duplicate { reason, .. } => {
                json!({ "message": format!("Duplicate trigger ignored: {}", reason) })
            }
            IntakeOutcome::Completed {
                result_key,
                transcript_key,
                elapsed_seconds,
                ..
            } => json!({
                "message": Stage::Completed.default_message(),
                "resultado_key": result_key,
                "transcripcion_key": transcript_key,
                "tiempo_procesamiento": elapsed_seconds,
            }),
            IntakeOutcome::Failed { error, .. } => json!({
                "error": error,
                "message": "Error during processing",
            }),
        }
    }

    /// `{statusCode, body}` envelope
    pub fn response(&self) -> Value {
        json!({ "statusCode": self.status_code(), "body": self.body() })
    }
}

/// Stage tracker of one run; every status write goes through here
struct JobRun<'a> {
    statuses: &'a JobStatusStore,
    job_id: JobId,
    file_key: String,
    request_id: String,
    stage: Stage,
}

impl JobRun<'_> {
    fn record(&self, stage: Stage) -> StatusRecord {
        StatusRecord::new(&self.file_key, stage, Some(self.request_id.clone()))
    }

    async fn advance(&mut self, stage: Stage) -> Result<(), PipelineError> {
        let record = self.record(stage);
        self.enter(record).await
    }

    async fn enter(&mut self, record: StatusRecord) -> Result<(), PipelineError> {
        let to = record.status;
        if !self.stage.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        self.statuses.record(&self.job_id, &record).await;
        self.stage = to;
        info!(job_id = %self.job_id, stage = %to, progress = record.progress, "Stage entered");
        Ok(())
    }

    async fn fail(&mut self, error: &PipelineError) {
        if !self.stage.can_transition_to(Stage::Error) {
            return;
        }
        let record = StatusRecord::failed(
            &self.file_key,
            &error.to_string(),
            Some(self.request_id.clone()),
        );
        self.statuses.record(&self.job_id, &record).await;
        self.stage = Stage::Error;
    }
}

/// Runs the pipeline for uploads
pub struct IntakeHandler {
    store: Arc<dyn ObjectStore>,
    statuses: JobStatusStore,
    credentials: Arc<dyn CredentialStore>,
    transcriber: Arc<dyn TranscriptionClient>,
    analyzer: Arc<dyn AnalysisClient>,
    namespaces: Namespaces,
    audio_grant_ttl: Duration,
    stale_after: Duration,
}

impl IntakeHandler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        namespaces: Namespaces,
        credentials: Arc<dyn CredentialStore>,
        transcriber: Arc<dyn TranscriptionClient>,
        analyzer: Arc<dyn AnalysisClient>,
    ) -> Self {
        Self {
            statuses: JobStatusStore::new(store.clone(), namespaces.clone()),
            store,
            credentials,
            transcriber,
            analyzer,
            namespaces,
            audio_grant_ttl: Duration::from_secs(900),
            stale_after: Duration::from_secs(1800),
        }
    }

    /// Lifetime of the read grant handed to the transcription service
    pub fn with_audio_grant_ttl(mut self, ttl: Duration) -> Self {
        self.audio_grant_ttl = ttl;
        self
    }

    /// Age after which an unfinished job may be claimed again
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Parse a trigger payload and handle each object in it, in order
    pub async fn handle_event(
        &self,
        event: &Value,
        request_id: &str,
    ) -> Result<Vec<IntakeOutcome>, ValidationError> {
        let objects = parse_trigger(event)?;
        let mut outcomes = Vec::with_capacity(objects.len());
        for object in &objects {
            outcomes.push(self.handle(object, request_id).await);
        }
        Ok(outcomes)
    }

    /// Handle one created object
    #[instrument(skip(self, object), fields(file_key = %object.key))]
    pub async fn handle(&self, object: &ObjectCreated, request_id: &str) -> IntakeOutcome {
        let started = Instant::now();
        let file_key = object.key.as_str();

        if object.bucket != self.store.bucket() {
            warn!(bucket = %object.bucket, "Object in an unknown bucket, ignoring");
            return IntakeOutcome::Ignored {
                file_key: file_key.to_string(),
                reason: format!("Object ignored: bucket '{}' is not served", object.bucket),
            };
        }

        if !self.namespaces.is_inbound(file_key) {
            info!("Object is not under {}, ignoring", self.namespaces.uploads);
            return IntakeOutcome::Ignored {
                file_key: file_key.to_string(),
                reason: format!("Object ignored: not under {}", self.namespaces.uploads),
            };
        }

        let job_id = match self.namespaces.job_id(file_key) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Cannot derive a job id");
                return IntakeOutcome::Failed {
                    job_id: None,
                    error: e.to_string(),
                };
            }
        };

        if let Err(reason) = self.claim(&job_id, file_key, request_id).await {
            info!(%job_id, %reason, "Skipping duplicate trigger");
            return IntakeOutcome::Duplicate { job_id, reason };
        }

        let mut run = JobRun {
            statuses: &self.statuses,
            job_id: job_id.clone(),
            file_key: file_key.to_string(),
            request_id: request_id.to_string(),
            stage: Stage::Starting,
        };

        match self.run_pipeline(&mut run, started).await {
            Ok(keys) => {
                let elapsed_seconds = round_seconds(started.elapsed());
                info!(%job_id, elapsed_seconds, "Processing completed");
                IntakeOutcome::Completed {
                    job_id,
                    result_key: keys.result_key,
                    transcript_key: keys.transcript_key,
                    elapsed_seconds,
                }
            }
            Err(e) => {
                error!(%job_id, error = %e, "Processing failed");
                run.fail(&e).await;
                IntakeOutcome::Failed {
                    job_id: Some(job_id),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Take ownership of a job by writing STARTING.
    ///
    /// `Err` carries the reason the trigger is a duplicate.
    async fn claim(&self, job_id: &JobId, file_key: &str, request_id: &str) -> Result<(), String> {
        let precondition = match self.statuses.read(job_id, file_key).await {
            Ok(snapshot) => {
                let current = &snapshot.record;
                if current.status == Stage::Completed {
                    return Err("job already completed".to_string());
                }
                if snapshot.exists()
                    && !current.status.is_terminal()
                    && !current.is_stale(Utc::now(), self.stale_after)
                {
                    return Err(format!("job already in progress ({})", current.status));
                }
                if snapshot.exists() {
                    info!(%job_id, previous = %current.status, "Re-running job");
                }
                snapshot.precondition()
            }
            Err(e) => {
                warn!(%job_id, error = %e, "Could not read status before claiming, proceeding");
                Precondition::None
            }
        };

        let record = StatusRecord::new(file_key, Stage::Starting, Some(request_id.to_string()));
        match self.statuses.claim(job_id, &record, precondition).await {
            Ok(_) => Ok(()),
            Err(StoreError::PreconditionFailed(_)) => {
                Err("job claimed by a concurrent run".to_string())
            }
            Err(e) => {
                // Status writes are best-effort; the run goes ahead unclaimed
                warn!(%job_id, error = %e, "Failed to write STARTING status");
                Ok(())
            }
        }
    }

    async fn run_pipeline(
        &self,
        run: &mut JobRun<'_>,
        started: Instant,
    ) -> Result<ArtifactKeys, PipelineError> {
        info!("Fetching API credentials");
        let credentials = self.credentials.fetch().await?;

        let audio = self
            .store
            .presign_get(&run.file_key, self.audio_grant_ttl)
            .map_err(PipelineError::AudioGrant)?;
        info!(
            audio_url = %audio.url.chars().take(LOGGED_URL_CHARS).collect::<String>(),
            "Issued audio read grant"
        );

        run.advance(Stage::Transcribing).await?;
        info!(service = self.transcriber.name(), "Requesting transcription");
        let transcription = self
            .transcriber
            .transcribe(&audio.url, &credentials.transcription_key)
            .await?;
        run.advance(Stage::TranscriptionCompleted).await?;

        if !transcription.has_text() {
            return Err(TranscriptionError::EmptyTranscript.into());
        }

        run.advance(Stage::Analyzing).await?;
        info!(service = self.analyzer.name(), "Requesting analysis");
        let analysis = self
            .analyzer
            .analyze(&transcription.text, &credentials.analysis_key)
            .await?;
        if analysis.is_degraded() {
            warn!(job_id = %run.job_id, "Model reply was not structured, keeping raw text");
        }

        let finished_at = Utc::now();
        let keys = self.namespaces.result_keys(&run.job_id, finished_at);
        let result = PipelineResult {
            metadata: ResultMetadata {
                original_file: run.file_key.clone(),
                bucket: self.store.bucket().to_string(),
                processed_at: finished_at,
                correlation_id: run.request_id.clone(),
                elapsed_seconds: round_seconds(started.elapsed()),
            },
            transcription,
            analysis,
        };

        self.persist(&keys.result_key, &result).await?;
        self.persist(&keys.transcript_key, &result.transcription).await?;

        let completed = StatusRecord::completed(
            &run.file_key,
            &keys,
            round_seconds(started.elapsed()),
            Some(run.request_id.clone()),
        );
        run.enter(completed).await?;

        Ok(keys)
    }

    /// Write an artifact once; an existing object is never replaced
    async fn persist<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PipelineError> {
        let body = serde_json::to_vec_pretty(value)?;
        self.store
            .put(key, body, JSON, Precondition::DoesNotExist)
            .await
            .map_err(|source| PipelineError::Persistence {
                key: key.to_string(),
                source,
            })?;
        info!(key, "Stored artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_envelopes() {
        let completed = IntakeOutcome::Completed {
            job_id: JobId::new("a"),
            result_key: "results/a_r.json".to_string(),
            transcript_key: "results/a_t.json".to_string(),
            elapsed_seconds: 4.2,
        };
        let response = completed.response();
        assert_eq!(response["statusCode"], 200);
        assert_eq!(response["body"]["resultado_key"], "results/a_r.json");
        assert_eq!(response["body"]["tiempo_procesamiento"], 4.2);

        let failed = IntakeOutcome::Failed {
            job_id: None,
            error: "boom".to_string(),
        };
        assert_eq!(failed.status_code(), 500);
        assert_eq!(failed.body()["error"], "boom");
    }

    #[test]
    fn test_pipeline_error_messages() {
        let e = PipelineError::from(TranscriptionError::EmptyTranscript);
        assert_eq!(e.to_string(), "Transcription failed: Transcription returned no text");

        let e = PipelineError::InvalidTransition {
            from: Stage::Starting,
            to: Stage::Completed,
        };
        assert_eq!(e.to_string(), "Invalid stage transition: STARTING -> COMPLETED");
    }
}
