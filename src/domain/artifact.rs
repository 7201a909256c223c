//! Result artifacts persisted by a completed job.
//!
//! Two objects per job: the full result (metadata, transcript, analysis) and
//! the transcript alone. Both are written once and never modified.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::Analysis;
use super::transcript::Transcription;

/// Keys of the two artifacts of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactKeys {
    /// Combined result (`..._resultado.json`)
    pub result_key: String,

    /// Transcript only (`..._transcripcion.json`)
    pub transcript_key: String,
}

/// Full pipeline result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub metadata: ResultMetadata,
    pub transcription: Transcription,
    pub analysis: Analysis,
}

/// Provenance of a pipeline result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Upload key the job was triggered by
    pub original_file: String,

    /// Bucket holding the upload and the artifacts
    pub bucket: String,

    /// When the result was assembled
    pub processed_at: DateTime<Utc>,

    /// Correlation id of the intake invocation
    pub correlation_id: String,

    /// Seconds from trigger to result assembly
    pub elapsed_seconds: f64,
}

/// Seconds rounded to two decimals, the precision reported to clients
pub fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
