//! AssemblyAI speech-to-text adapter.
//!
//! Submits the audio URL as a transcript job, then polls the job until the
//! provider reports `completed` or `error`. The whole exchange is bounded by
//! `max_wait_seconds`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use super::{TranscriptionClient, TranscriptionError};
use crate::domain::{Transcription, Utterance};

/// Transcription request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSettings {
    /// Provider API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Spoken language (default: "es")
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Split the transcript by speaker
    #[serde(default = "default_true")]
    pub speaker_labels: bool,

    /// Expected number of speakers (default: 2)
    #[serde(default = "default_speakers_expected")]
    pub speakers_expected: u32,

    #[serde(default = "default_true")]
    pub format_text: bool,

    #[serde(default = "default_true")]
    pub punctuate: bool,

    /// Delay between status polls in milliseconds (default: 3000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up after this many seconds (default: 900)
    #[serde(default = "default_max_wait_seconds")]
    pub max_wait_seconds: u64,
}

fn default_base_url() -> String {
    "https://api.assemblyai.com".to_string()
}
fn default_language_code() -> String {
    "es".to_string()
}
fn default_true() -> bool {
    true
}
fn default_speakers_expected() -> u32 {
    2
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_max_wait_seconds() -> u64 {
    900
} // 15 minutes, the lifetime of the audio read grant

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language_code: default_language_code(),
            speaker_labels: true,
            speakers_expected: default_speakers_expected(),
            format_text: true,
            punctuate: true,
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_seconds: default_max_wait_seconds(),
        }
    }
}

/// The fields of a transcript job we read
#[derive(Debug, Deserialize)]
struct TranscriptJob {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    utterances: Option<Vec<Utterance>>,
    #[serde(default)]
    error: Option<String>,
}

/// AssemblyAI client
pub struct AssemblyAiClient {
    settings: TranscriptionSettings,
    client: reqwest::Client,
}

impl AssemblyAiClient {
    pub fn new(settings: TranscriptionSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn transcript_url(&self) -> String {
        format!("{}/v2/transcript", self.settings.base_url.trim_end_matches('/'))
    }

    fn request_body(&self, audio_url: &str) -> Value {
        json!({
            "audio_url": audio_url,
            "speaker_labels": self.settings.speaker_labels,
            "speakers_expected": self.settings.speakers_expected,
            "language_code": self.settings.language_code,
            "format_text": self.settings.format_text,
            "punctuate": self.settings.punctuate,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, TranscriptionError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::Provider(format!("status {}: {}", status, body)));
        }
        Ok(response.json().await?)
    }

    /// Submit and poll until the job reaches a final status
    async fn run_job(&self, audio_url: &str, api_key: &str) -> Result<Value, TranscriptionError> {
        let submitted = self
            .send(
                self.client
                    .post(self.transcript_url())
                    .header("authorization", api_key)
                    .json(&self.request_body(audio_url)),
            )
            .await?;
        let job = parse_job(&submitted)?;
        info!(transcript_id = %job.id, "Submitted transcript job");

        let poll_url = format!("{}/{}", self.transcript_url(), job.id);
        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        loop {
            let current = self
                .send(self.client.get(&poll_url).header("authorization", api_key))
                .await?;
            let job = parse_job(&current)?;
            match job.status.as_str() {
                "completed" | "error" => return Ok(current),
                status => debug!(transcript_id = %job.id, status, "Transcript not ready"),
            }
            sleep(interval).await;
        }
    }
}

fn parse_job(value: &Value) -> Result<TranscriptJob, TranscriptionError> {
    serde_json::from_value(value.clone()).map_err(|e| TranscriptionError::Parse(e.to_string()))
}

/// Last path segment of the audio URL, query string removed
fn file_name_from_url(audio_url: &str) -> String {
    let path = audio_url.split(['?', '#']).next().unwrap_or(audio_url);
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Turn a finished transcript job into a [`Transcription`]
fn into_transcription(data: Value, audio_url: &str) -> Result<Transcription, TranscriptionError> {
    let job = parse_job(&data)?;
    if job.status == "error" {
        return Err(TranscriptionError::Provider(
            job.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    Ok(Transcription {
        success: true,
        file_name: file_name_from_url(audio_url),
        id: job.id,
        text: job.text.unwrap_or_default(),
        audio_duration: job.audio_duration,
        utterances: job.utterances.unwrap_or_default(),
        data,
    })
}

#[async_trait]
impl TranscriptionClient for AssemblyAiClient {
    fn name(&self) -> &str {
        "assemblyai"
    }

    async fn transcribe(
        &self,
        audio_url: &str,
        api_key: &str,
    ) -> Result<Transcription, TranscriptionError> {
        let max_wait = self.settings.max_wait_seconds;
        let data = timeout(Duration::from_secs(max_wait), self.run_job(audio_url, api_key))
            .await
            .map_err(|_| TranscriptionError::Timeout(max_wait))??;

        let transcription = into_transcription(data, audio_url)?;
        info!(
            duration = ?transcription.audio_duration,
            utterances = transcription.utterances.len(),
            "Transcription completed"
        );
        Ok(transcription)
    }
}
