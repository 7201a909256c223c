//! Shared fakes for the integration tests.
//!
//! Every external service is replaced: a `MemoryObjectStore` bucket, fixed
//! credentials, and scripted transcription and analysis clients.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use voxpipe::adapters::{
    AnalysisClient, AnalysisError, CredentialStore, GrantSigner, MemoryObjectStore, ObjectStore,
    Precondition, StaticCredentials, TranscriptionClient, TranscriptionError,
};
use voxpipe::config::{Namespaces, Settings};
use voxpipe::core::{IntakeHandler, JobStatusStore, ObjectCreated, StatusQueryHandler};
use voxpipe::domain::{Analysis, JobId, StatusRecord, Transcription, Utterance};
use voxpipe::server::AppState;

pub const BUCKET: &str = "media";
pub const BASE_URL: &str = "http://localhost:9000";
pub const UPLOAD_KEY: &str = "uploads/20240101_ab12cd34_meeting.mp3";
pub const JOB_ID: &str = "20240101_ab12cd34_meeting";
pub const STATUS_KEY: &str = "processing/20240101_ab12cd34_meeting_status.json";

pub const TRANSCRIPTION_KEY: &str = "aai-test-key";
pub const ANALYSIS_KEY: &str = "anthropic-test-key";

pub const STRUCTURED_REPLY: &str = r#"{
    "summary": "Weekly sync about the release.",
    "highlights": ["Release moved to Friday", "QA signed off", "Docs pending"],
    "topics": ["release", "qa"],
    "estimated_duration": "5 minutes",
    "tone": "informal"
}"#;

/// What the fake transcriber answers with
#[derive(Debug, Clone)]
pub enum TranscriptScript {
    Text(String),
    Empty,
    ProviderError(String),
}

/// Scripted speech-to-text client that remembers what it was asked
pub struct FakeTranscriber {
    script: TranscriptScript,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeTranscriber {
    pub fn new(script: TranscriptScript) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(TranscriptScript::Text(text.to_string()))
    }

    /// `(audio_url, api_key)` of every call
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionClient for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-transcriber"
    }

    async fn transcribe(
        &self,
        audio_url: &str,
        api_key: &str,
    ) -> Result<Transcription, TranscriptionError> {
        self.calls
            .lock()
            .unwrap()
            .push((audio_url.to_string(), api_key.to_string()));

        let text = match &self.script {
            TranscriptScript::Text(text) => text.clone(),
            TranscriptScript::Empty => String::new(),
            TranscriptScript::ProviderError(message) => {
                return Err(TranscriptionError::Provider(message.clone()))
            }
        };

        Ok(Transcription {
            success: true,
            data: serde_json::json!({ "status": "completed", "text": text }),
            file_name: "meeting.mp3".to_string(),
            id: "tx-1".to_string(),
            utterances: vec![Utterance {
                speaker: "A".to_string(),
                text: text.clone(),
                start: 0,
                end: 1500,
            }],
            text,
            audio_duration: Some(1.5),
        })
    }
}

/// Analysis client answering with a fixed model reply
pub struct FakeAnalyzer {
    reply: Result<String, String>,
    calls: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Transcripts it was asked to analyze
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalyzer {
    fn name(&self) -> &str {
        "fake-analyzer"
    }

    async fn analyze(&self, transcript: &str, _api_key: &str) -> Result<Analysis, AnalysisError> {
        self.calls.lock().unwrap().push(transcript.to_string());
        match &self.reply {
            Ok(reply) => Ok(Analysis::from_model_text(reply, Utc::now()).with_usage(42, "fake-model")),
            Err(message) => Err(AnalysisError::Provider(message.clone())),
        }
    }
}

pub fn signer() -> Arc<GrantSigner> {
    Arc::new(GrantSigner::new("test-signing-key", BASE_URL, BUCKET).unwrap())
}

/// Everything a pipeline test needs, wired around one in-memory bucket
pub struct Harness {
    pub store: Arc<MemoryObjectStore>,
    pub transcriber: Arc<FakeTranscriber>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub intake: IntakeHandler,
    pub status: StatusQueryHandler,
}

impl Harness {
    pub fn new(transcriber: FakeTranscriber, analyzer: FakeAnalyzer) -> Self {
        Self::with_credentials(
            transcriber,
            analyzer,
            Arc::new(StaticCredentials::new(TRANSCRIPTION_KEY, ANALYSIS_KEY)),
        )
    }

    pub fn with_credentials(
        transcriber: FakeTranscriber,
        analyzer: FakeAnalyzer,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let store = Arc::new(MemoryObjectStore::new(signer()));
        let transcriber = Arc::new(transcriber);
        let analyzer = Arc::new(analyzer);

        let intake = IntakeHandler::new(
            store.clone(),
            Namespaces::default(),
            credentials,
            transcriber.clone(),
            analyzer.clone(),
        );
        let status = StatusQueryHandler::new(store.clone(), Namespaces::default());

        Self {
            store,
            transcriber,
            analyzer,
            intake,
            status,
        }
    }

    /// Transcript and analysis both succeed
    pub fn happy() -> Self {
        Self::new(
            FakeTranscriber::text("hola a todos, empezamos la reunion"),
            FakeAnalyzer::replying(STRUCTURED_REPLY),
        )
    }

    pub fn statuses(&self) -> JobStatusStore {
        JobStatusStore::new(self.store.clone(), Namespaces::default())
    }

    /// Put an audio object where a client upload would land
    pub async fn upload(&self, key: &str) {
        self.store
            .put(key, b"ID3fake-audio".to_vec(), "audio/mpeg", Precondition::None)
            .await
            .unwrap();
    }

    /// Seed the status record of the test job
    pub async fn seed_status(&self, record: &StatusRecord) {
        self.statuses()
            .write(&JobId::new(JOB_ID), record)
            .await
            .unwrap();
    }

    /// Every status record written for the test job, oldest first
    pub fn status_history(&self) -> Vec<StatusRecord> {
        self.store
            .versions(STATUS_KEY)
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }

    /// Keys under `results/`
    pub async fn result_keys(&self) -> Vec<String> {
        self.store
            .keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with("results/"))
            .collect()
    }
}

pub fn created(key: &str) -> ObjectCreated {
    ObjectCreated::new(BUCKET, key)
}

/// Router state over an in-memory bucket and the given fakes
pub fn app_state(
    store: Arc<MemoryObjectStore>,
    transcriber: FakeTranscriber,
    analyzer: FakeAnalyzer,
) -> AppState {
    let settings = Settings::with_home(std::env::temp_dir().join("voxpipe-tests"));
    AppState::new(
        &settings,
        signer(),
        store,
        Arc::new(StaticCredentials::new(TRANSCRIPTION_KEY, ANALYSIS_KEY)),
        Arc::new(transcriber),
        Arc::new(analyzer),
    )
}
