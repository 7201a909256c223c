//! Content analysis produced by the language model.
//!
//! The model is asked for a JSON object. When its reply cannot be read as one,
//! a degraded analysis carrying the raw reply is used instead of failing the job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured analysis of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Two or three sentence summary
    pub summary: String,

    /// Highlighted points (the prompt asks for 3-5)
    #[serde(default)]
    pub highlights: Vec<String>,

    /// Main topics discussed
    #[serde(default)]
    pub topics: Vec<String>,

    /// Estimated conversation length, as described by the model
    #[serde(default)]
    pub estimated_duration: Option<String>,

    /// Overall tone
    #[serde(default)]
    pub tone: Option<String>,

    /// When the analysis was produced
    #[serde(default)]
    pub analyzed_at: Option<String>,

    /// Verbatim model reply (degraded results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Input plus output tokens of the model call
    #[serde(default)]
    pub tokens_used: Option<u64>,

    /// Model that produced the reply
    #[serde(default)]
    pub model: Option<String>,
}

impl Analysis {
    /// Read a model reply, falling back to a degraded analysis.
    ///
    /// The reply may be bare JSON or JSON inside a fenced code block.
    pub fn from_model_text(text: &str, now: DateTime<Utc>) -> Self {
        let parsed = serde_json::from_str::<Analysis>(text.trim())
            .ok()
            .or_else(|| fenced_json(text).and_then(|body| serde_json::from_str(body).ok()));

        match parsed {
            Some(mut analysis) => {
                // Fields the model must not set
                analysis.raw_text = None;
                analysis.tokens_used = None;
                analysis.model = None;
                if analysis.analyzed_at.is_none() {
                    analysis.analyzed_at = Some(now.to_rfc3339());
                }
                analysis
            }
            None => Self::degraded(text, now),
        }
    }

    /// Placeholder analysis carrying the raw reply
    pub fn degraded(raw_text: &str, now: DateTime<Utc>) -> Self {
        Self {
            summary: "Analysis available as plain text".to_string(),
            highlights: vec!["See the full analysis in the 'raw_text' field".to_string()],
            topics: vec!["General analysis".to_string()],
            estimated_duration: Some("Not determined".to_string()),
            tone: Some("Not determined".to_string()),
            analyzed_at: Some(now.to_rfc3339()),
            raw_text: Some(raw_text.to_string()),
            tokens_used: None,
            model: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.raw_text.is_some()
    }

    /// Attach usage metadata of the model call
    pub fn with_usage(mut self, tokens_used: u64, model: impl Into<String>) -> Self {
        self.tokens_used = Some(tokens_used);
        self.model = Some(model.into());
        self
    }
}

/// Body of the first ``` fenced block, if any
fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip the info string (e.g. "json") up to the end of the line
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}
