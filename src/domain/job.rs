//! Job identity and the stage state machine.
//!
//! A job has no record of its own: it is identified by an id derived from the
//! upload key, and its progress is whatever the latest status record says.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a job, derived from the upload key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an already-derived id.
    ///
    /// Use `Namespaces::job_id` to derive one from an upload key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stage of a job.
///
/// Forward order: `Pending` → `Starting` → `Transcribing` →
/// `TranscriptionCompleted` → `Analyzing` → `Completed`. `Error` is reachable
/// from every non-terminal stage. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// No status record exists yet (never persisted)
    Pending,

    /// Intake picked the upload up
    Starting,

    /// Waiting on the speech-to-text service
    Transcribing,

    /// Transcript received
    TranscriptionCompleted,

    /// Waiting on the analysis model
    Analyzing,

    /// Artifacts persisted
    Completed,

    /// Failed; the message carries the cause
    Error,
}

impl Stage {
    /// Stages a successful job passes through, in order
    pub const FORWARD: [Stage; 6] = [
        Stage::Pending,
        Stage::Starting,
        Stage::Transcribing,
        Stage::TranscriptionCompleted,
        Stage::Analyzing,
        Stage::Completed,
    ];

    /// Progress percentage reported for this stage
    pub fn progress(self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::Starting => 10,
            Stage::Transcribing => 30,
            Stage::TranscriptionCompleted => 60,
            Stage::Analyzing => 80,
            Stage::Completed => 100,
            Stage::Error => 0,
        }
    }

    /// Human-readable description used in status records
    pub fn default_message(self) -> &'static str {
        match self {
            Stage::Pending => "File is queued for processing",
            Stage::Starting => "Processing started",
            Stage::Transcribing => "Transcribing audio",
            Stage::TranscriptionCompleted => "Transcription completed",
            Stage::Analyzing => "Analyzing content",
            Stage::Completed => "Processing completed successfully",
            Stage::Error => "Processing failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    /// Position in the forward order (`None` for `Error`)
    fn rank(self) -> Option<usize> {
        Self::FORWARD.iter().position(|s| *s == self)
    }

    /// The stage that follows this one on the success path
    pub fn next(self) -> Option<Stage> {
        self.rank().and_then(|r| Self::FORWARD.get(r + 1).copied())
    }

    /// Whether `to` is a legal transition from this stage.
    ///
    /// Only single forward steps and jumps to `Error` are allowed, and
    /// nothing leaves a terminal stage.
    pub fn can_transition_to(self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Stage::Error || self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pending => "PENDING",
            Stage::Starting => "STARTING",
            Stage::Transcribing => "TRANSCRIBING",
            Stage::TranscriptionCompleted => "TRANSCRIPTION_COMPLETED",
            Stage::Analyzing => "ANALYZING",
            Stage::Completed => "COMPLETED",
            Stage::Error => "ERROR",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_progress_is_increasing() {
        let progress: Vec<u8> = Stage::FORWARD.iter().map(|s| s.progress()).collect();
        assert_eq!(progress, vec![0, 10, 30, 60, 80, 100]);
    }

    #[test]
    fn test_single_step_transitions_only() {
        assert!(Stage::Pending.can_transition_to(Stage::Starting));
        assert!(Stage::Starting.can_transition_to(Stage::Transcribing));
        assert!(Stage::Analyzing.can_transition_to(Stage::Completed));

        assert!(!Stage::Starting.can_transition_to(Stage::Analyzing));
        assert!(!Stage::Transcribing.can_transition_to(Stage::Starting));
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        for stage in Stage::FORWARD.iter().filter(|s| !s.is_terminal()) {
            assert!(stage.can_transition_to(Stage::Error), "{stage}");
        }
    }

    #[test]
    fn test_terminal_stages_are_final() {
        for to in Stage::FORWARD.iter().chain([Stage::Error].iter()) {
            assert!(!Stage::Completed.can_transition_to(*to));
            assert!(!Stage::Error.can_transition_to(*to));
        }
    }

    #[test]
    fn test_stage_wire_names() {
        let json = serde_json::to_string(&Stage::TranscriptionCompleted).unwrap();
        assert_eq!(json, "\"TRANSCRIPTION_COMPLETED\"");

        let parsed: Stage = serde_json::from_str("\"ANALYZING\"").unwrap();
        assert_eq!(parsed, Stage::Analyzing);
        assert_eq!(Stage::Analyzing.to_string(), "ANALYZING");
    }
}
