//! Core orchestration logic.
//!
//! This module contains:
//! - Limits: upload validation
//! - UploadGrantIssuer: write grants for new uploads
//! - JobStatusStore: status records and conditional claims
//! - IntakeHandler: the transcription and analysis pipeline
//! - StatusQueryHandler: read-only status for polling clients

pub mod limits;
pub mod orchestrator;
pub mod status_query;
pub mod status_store;
pub mod trigger;
pub mod upload_grant;

// Re-export commonly used types
pub use limits::{sanitize_file_name, UploadLimits, ValidationError};
pub use orchestrator::{IntakeHandler, IntakeOutcome, PipelineError};
pub use status_query::{QueryError, StatusQueryHandler};
pub use status_store::{JobStatusStore, StatusSnapshot};
pub use trigger::{parse_trigger, ObjectCreated};
pub use upload_grant::{UploadError, UploadGrant, UploadGrantIssuer, UploadRequest};
