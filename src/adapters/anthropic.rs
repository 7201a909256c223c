//! Anthropic Messages API adapter for transcript analysis.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{AnalysisClient, AnalysisError};
use crate::domain::Analysis;

const DEFAULT_PROMPT: &str = r#"Analyze the following audio transcript and provide:

1. **Short summary** (2-3 sentences about the main content)
2. **Highlights** (3-5 important points mentioned)
3. **Main topics** (categories or subjects discussed)
4. **Estimated conversation length** (if it can be inferred)
5. **Overall tone** (formal, informal, technical, etc.)

Reply in JSON with this structure:
{
    "summary": "summary text",
    "highlights": ["point 1", "point 2", "point 3"],
    "topics": ["topic 1", "topic 2"],
    "estimated_duration": "X minutes",
    "tone": "description of the tone",
    "analyzed_at": "date and time of the analysis"
}

Transcript to analyze:"#;

/// Analysis request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Provider API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Reply length cap (default: 1000)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Instructions placed before the transcript
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_api_version() -> String {
    "2023-06-01".to_string()
}
fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_version: default_api_version(),
            prompt: default_prompt(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl MessagesResponse {
    /// Concatenated text blocks of the reply
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect()
    }
}

/// Anthropic client
pub struct AnthropicClient {
    settings: AnalysisSettings,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn prompt_for(&self, transcript: &str) -> String {
        format!("{}\n\n{}", self.settings.prompt, transcript)
    }

    /// Build the analysis from a reply, attaching usage either way
    fn analysis_from(&self, reply: &MessagesResponse) -> Analysis {
        Analysis::from_model_text(&reply.text(), Utc::now()).with_usage(
            reply.usage.input_tokens + reply.usage.output_tokens,
            self.settings.model.clone(),
        )
    }
}

#[async_trait]
impl AnalysisClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn analyze(&self, transcript: &str, api_key: &str) -> Result<Analysis, AnalysisError> {
        let url = format!("{}/v1/messages", self.settings.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.settings.api_version)
            .json(&json!({
                "model": self.settings.model,
                "max_tokens": self.settings.max_tokens,
                "temperature": self.settings.temperature,
                "messages": [{"role": "user", "content": self.prompt_for(transcript)}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnalysisError::Provider(format!("status {}: {}", status, body)));
        }

        let reply: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        let analysis = self.analysis_from(&reply);
        info!(
            tokens = ?analysis.tokens_used,
            degraded = analysis.is_degraded(),
            "Analysis completed"
        );
        Ok(analysis)
    }
}
