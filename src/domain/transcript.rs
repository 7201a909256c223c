//! Transcript returned by the speech-to-text service.

use serde::{Deserialize, Serialize};

/// Speaker-labelled transcription of one audio file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    /// Always true for a transcript that made it out of the client
    pub success: bool,

    /// Raw provider response, kept verbatim
    #[serde(default)]
    pub data: serde_json::Value,

    /// File name derived from the audio reference
    pub file_name: String,

    /// Provider job id
    pub id: String,

    /// Full transcript text
    #[serde(default)]
    pub text: String,

    /// Audio duration as reported by the provider (seconds)
    #[serde(default)]
    pub audio_duration: Option<f64>,

    /// Speaker turns
    #[serde(default)]
    pub utterances: Vec<Utterance>,
}

impl Transcription {
    /// Whether there is anything to analyze
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A single speaker turn; offsets are in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    pub start: u64,
    pub end: u64,
}
