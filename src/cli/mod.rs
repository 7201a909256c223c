//! Command-line interface for voxpipe.
//!
//! Provides commands for serving the HTTP API, issuing upload grants,
//! checking job status and running the pipeline by hand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Settings;
use crate::core::{IntakeOutcome, ObjectCreated, UploadRequest};
use crate::server::{self, AppState};

/// voxpipe - audio transcription and analysis jobs with polled status
#[derive(Parser, Debug)]
#[command(name = "voxpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to (overrides config)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Issue an upload grant for a new audio file
    UploadLink {
        /// Original file name
        file_name: String,

        /// Declared content type (e.g. audio/mpeg)
        content_type: String,

        /// Declared size in bytes
        size: u64,
    },

    /// Check the processing status of an uploaded file
    Status {
        /// Key of the uploaded object (e.g. uploads/20240101_ab12cd34_memo.mp3)
        file_key: String,
    },

    /// Run the pipeline once for an object already in the bucket
    Process {
        /// Key of the uploaded object
        #[arg(required_unless_present = "event", conflicts_with = "event")]
        file_key: Option<String>,

        /// Object-created notification to process instead (JSON file)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let mut settings = Settings::load()?;

        match self.command {
            Commands::Serve { address } => {
                if let Some(address) = address {
                    settings.server.bind = address;
                }
                server::serve(&settings).await
            }
            Commands::UploadLink {
                file_name,
                content_type,
                size,
            } => upload_link(&settings, file_name, content_type, size).await,
            Commands::Status { file_key } => show_status(&settings, &file_key).await,
            Commands::Process { file_key, event } => {
                process(&settings, file_key, event).await
            }
            Commands::Config => show_config(&settings),
        }
    }
}

/// Issue an upload grant and print it
async fn upload_link(
    settings: &Settings,
    file_name: String,
    content_type: String,
    size: u64,
) -> Result<()> {
    let state = AppState::from_settings(settings).await?;
    let grant = state
        .uploads
        .issue(&UploadRequest::new(file_name, content_type, size))?;

    println!("{}", serde_json::to_string_pretty(&grant)?);
    Ok(())
}

/// Show the status of a job
async fn show_status(settings: &Settings, file_key: &str) -> Result<()> {
    let state = AppState::from_settings(settings).await?;
    let view = state.status.query(file_key).await?;

    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Run the intake pipeline in the foreground
async fn process(
    settings: &Settings,
    file_key: Option<String>,
    event: Option<PathBuf>,
) -> Result<()> {
    let state = AppState::from_settings(settings).await?;
    let request_id = Uuid::new_v4().to_string();

    let outcomes = match (file_key, event) {
        (_, Some(path)) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read event file: {}", path.display()))?;
            let event: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Event file is not JSON: {}", path.display()))?;
            state.intake.handle_event(&event, &request_id).await?
        }
        (Some(key), None) => {
            let object = ObjectCreated::new(&settings.bucket, key);
            vec![state.intake.handle(&object, &request_id).await]
        }
        (None, None) => anyhow::bail!("Provide a file key or --event <path>"),
    };

    let mut failed = false;
    for outcome in &outcomes {
        println!("{}", serde_json::to_string_pretty(&outcome.response())?);
        failed |= matches!(outcome, IntakeOutcome::Failed { .. });
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the resolved configuration as YAML
fn show_config(settings: &Settings) -> Result<()> {
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Bucket root: {}", settings.bucket_root().display());
    println!("Secrets:     {}", settings.secrets_file().display());
    println!();
    print!("{}", serde_yaml::to_string(settings)?);
    Ok(())
}
