//! Domain types for the voxpipe pipeline.
//!
//! This module contains the core data structures:
//! - Job: identity and stage state machine
//! - Status: persisted status records and client views
//! - Artifact: persisted results
//! - Transcript / Analysis: outputs of the external services

pub mod analysis;
pub mod artifact;
pub mod job;
pub mod status;
pub mod transcript;

// Re-export commonly used types
pub use analysis::Analysis;
pub use artifact::{round_seconds, ArtifactKeys, PipelineResult, ResultMetadata};
pub use job::{JobId, Stage};
pub use status::{StatusRecord, StatusView};
pub use transcript::{Transcription, Utterance};
