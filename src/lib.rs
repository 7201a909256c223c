//! voxpipe - Asynchronous audio transcription and analysis pipeline
//!
//! A client uploads an audio file through a time-boxed grant, the upload
//! triggers a job that transcribes and analyzes it, and the client polls the
//! job status with the key it uploaded to until results are ready.
//!
//! # Architecture
//!
//! All cross-stage state lives in the object store:
//! - Each job has one status record, rewritten after every stage
//! - Results are immutable objects under their own namespace
//! - Status queries are read-only and never advance a job
//!
//! # Modules
//!
//! - `adapters`: Object store, credentials, speech-to-text and LLM clients
//! - `core`: Upload grants, intake pipeline, status store and queries
//! - `domain`: Data structures (Stage, StatusRecord, Transcription, Analysis)
//! - `server`: HTTP surface
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API
//! voxpipe serve
//!
//! # Ask for an upload grant
//! voxpipe upload-link meeting.mp3 audio/mpeg 1048576
//!
//! # Poll a job
//! voxpipe status uploads/20240101_120000_ab12cd34_meeting.mp3
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use core::{IntakeHandler, IntakeOutcome, StatusQueryHandler, UploadGrantIssuer};
pub use domain::{Analysis, JobId, Stage, StatusRecord, StatusView, Transcription};
pub use server::{create_router, AppState};
