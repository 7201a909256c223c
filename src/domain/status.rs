//! Status records and the view handed to polling clients.
//!
//! A status record is the only persisted representation of a job. It is
//! overwritten in place on every stage change; no history is kept.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::ArtifactKeys;
use super::job::Stage;

/// Persisted status of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Original upload key
    pub file_key: String,

    /// Current stage
    pub status: Stage,

    /// Human-readable description of the stage
    pub message: String,

    /// Percent complete (0-100)
    pub progress: u8,

    /// Time of the last update
    pub timestamp: DateTime<Utc>,

    /// Correlation id of the invocation that wrote this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Key of the combined result (COMPLETED only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resultado_key: Option<String>,

    /// Key of the transcript-only result (COMPLETED only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcripcion_key: Option<String>,

    /// Total processing time in seconds (COMPLETED only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiempo_total: Option<f64>,
}

impl StatusRecord {
    /// Record for `stage` with its default message and progress
    pub fn new(file_key: impl Into<String>, stage: Stage, request_id: Option<String>) -> Self {
        Self {
            file_key: file_key.into(),
            status: stage,
            message: stage.default_message().to_string(),
            progress: stage.progress(),
            timestamp: Utc::now(),
            request_id,
            resultado_key: None,
            transcripcion_key: None,
            tiempo_total: None,
        }
    }

    /// Synthesized record for a job nobody has written yet
    pub fn pending(file_key: impl Into<String>) -> Self {
        Self::new(file_key, Stage::Pending, None)
    }

    /// Terminal success record pointing at the persisted artifacts
    pub fn completed(
        file_key: impl Into<String>,
        keys: &ArtifactKeys,
        elapsed_seconds: f64,
        request_id: Option<String>,
    ) -> Self {
        Self {
            resultado_key: Some(keys.result_key.clone()),
            transcripcion_key: Some(keys.transcript_key.clone()),
            tiempo_total: Some(elapsed_seconds),
            ..Self::new(file_key, Stage::Completed, request_id)
        }
    }

    /// Terminal failure record; the message carries the failure text
    pub fn failed(file_key: impl Into<String>, error: &str, request_id: Option<String>) -> Self {
        Self {
            message: format!("Error: {}", error),
            ..Self::new(file_key, Stage::Error, request_id)
        }
    }

    /// Artifact keys, only for a completed record that carries both
    pub fn artifacts(&self) -> Option<ArtifactKeys> {
        if self.status != Stage::Completed {
            return None;
        }
        Some(ArtifactKeys {
            result_key: self.resultado_key.clone()?,
            transcript_key: self.transcripcion_key.clone()?,
        })
    }

    /// A non-terminal record that has not moved for longer than `stale_after`
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let age = now.signed_duration_since(self.timestamp);
        age.to_std().map(|age| age > stale_after).unwrap_or(false)
    }
}

/// Status as reported to a polling client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub record: StatusRecord,

    /// Short-lived read URL of the combined result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resultado_download_url: Option<String>,

    /// Short-lived read URL of the transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcripcion_download_url: Option<String>,

    /// Whether the client should keep polling
    pub polling_recommended: bool,

    /// When this view was produced
    pub timestamp_consulta: DateTime<Utc>,

    /// Set when the job stopped advancing and is reported as failed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

impl StatusView {
    pub fn from_record(record: StatusRecord, now: DateTime<Utc>) -> Self {
        let polling_recommended = !record.status.is_terminal();
        Self {
            record,
            resultado_download_url: None,
            transcripcion_download_url: None,
            polling_recommended,
            timestamp_consulta: now,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> ArtifactKeys {
        ArtifactKeys {
            result_key: "results/a_20240101_000000_resultado.json".to_string(),
            transcript_key: "results/a_20240101_000000_transcripcion.json".to_string(),
        }
    }

    #[test]
    fn test_record_wire_format() {
        let record = StatusRecord::completed("uploads/a.mp3", &keys(), 12.5, Some("req-1".into()));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["file_key"], "uploads/a.mp3");
        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["request_id"], "req-1");
        assert_eq!(json["resultado_key"], "results/a_20240101_000000_resultado.json");
        assert_eq!(json["tiempo_total"], 12.5);
    }

    #[test]
    fn test_in_progress_record_omits_artifacts() {
        let record = StatusRecord::new("uploads/a.mp3", Stage::Transcribing, None);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["progress"], 30);
        assert!(json.get("resultado_key").is_none());
        assert!(record.artifacts().is_none());
    }

    #[test]
    fn test_failed_record() {
        let record = StatusRecord::failed("uploads/a.mp3", "boom", None);
        assert_eq!(record.status, Stage::Error);
        assert_eq!(record.progress, 0);
        assert_eq!(record.message, "Error: boom");
    }

    #[test]
    fn test_staleness() {
        let mut record = StatusRecord::new("uploads/a.mp3", Stage::Analyzing, None);
        let now = record.timestamp + chrono::Duration::seconds(120);

        assert!(record.is_stale(now, Duration::from_secs(60)));
        assert!(!record.is_stale(now, Duration::from_secs(600)));

        record.status = Stage::Completed;
        assert!(!record.is_stale(now, Duration::from_secs(60)));
    }

    #[test]
    fn test_view_flattens_record() {
        let record = StatusRecord::pending("uploads/a.mp3");
        let view = StatusView::from_record(record, Utc::now());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["polling_recommended"], true);
        assert!(json.get("stale").is_none());
        assert!(json.get("timestamp_consulta").is_some());
    }
}
