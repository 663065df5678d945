//! AI content classification of outbound bot email
//!
//! The model output is treated as untrusted input: it must be a JSON array
//! of `{id, status, reason}` objects, and only ids from the submitted batch
//! are kept.

pub mod anthropic;

pub use anthropic::AnthropicClassifier;

use async_trait::async_trait;
use botsentry_common::types::{MessageId, SuggestedStatus};
use botsentry_storage::models::truncate_chars;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// Maximum length of raw model output kept in error values and logs
pub const RAW_SNIPPET_CHARS: usize = 500;

/// System prompt sent with every classification request
pub const SYSTEM_PROMPT: &str = "You review emails sent by automated bot mailboxes for abuse. \
Most emails are legitimate: only return the ones that are genuinely suspicious and leave everything else out. \
For each suspicious email choose a status: \"suspended\" for fraud, phishing or malware; \
\"under_review\" for clear scam patterns such as requests for payment, credentials or wallet details; \
\"flagged\" for concerning but ambiguous content such as unsolicited cryptocurrency mentions. \
Reply with only a JSON array, no prose, where each element is \
{\"id\": \"<email id>\", \"status\": \"flagged\" | \"under_review\" | \"suspended\", \"reason\": \"<short explanation>\"}. \
Reply with [] if nothing is suspicious.";

/// One message submitted for classification
#[derive(Debug, Clone)]
pub struct ClassifierInput {
    pub id: MessageId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Validated classifier verdict for one submitted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub message_id: MessageId,
    pub status: SuggestedStatus,
    pub reason: String,
}

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier not configured: {0}")]
    NotConfigured(String),

    #[error("Classifier request failed: {0}")]
    Http(String),

    #[error("Classifier returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Classifier response contained no text content")]
    NoText,

    #[error("Failed to parse classifier output: {message} (raw: {raw})")]
    Parse { message: String, raw: String },

    #[error("Classifier output failed validation: {message} (raw: {raw})")]
    Schema { message: String, raw: String },
}

impl ClassifierError {
    /// Truncated model output for parse and schema failures
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Parse { raw, .. } | Self::Schema { raw, .. } => Some(raw),
            _ => None,
        }
    }

    fn parse(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            message: message.into(),
            raw: truncate_chars(raw, RAW_SNIPPET_CHARS),
        }
    }

    fn schema(message: impl Into<String>, raw: &str) -> Self {
        Self::Schema {
            message: message.into(),
            raw: truncate_chars(raw, RAW_SNIPPET_CHARS),
        }
    }
}

/// Content classifier trait
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Classify a batch of messages. Empty input yields no verdicts and no model call.
    async fn classify(&self, inputs: &[ClassifierInput]) -> Result<Vec<Verdict>, ClassifierError>;
}

#[derive(Serialize)]
struct PromptEmail<'a> {
    id: String,
    to: &'a str,
    subject: &'a str,
    body: String,
}

/// Render the user prompt for a batch, truncating each body
pub fn build_prompt(inputs: &[ClassifierInput], max_body_chars: usize) -> String {
    let emails: Vec<PromptEmail<'_>> = inputs
        .iter()
        .map(|input| PromptEmail {
            id: input.id.to_string(),
            to: &input.recipient,
            subject: &input.subject,
            body: truncate_chars(&input.body, max_body_chars),
        })
        .collect();

    let listing = serde_json::to_string_pretty(&emails).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Review the following {} emails and return the suspicious ones.\n\n{}",
        emails.len(),
        listing
    )
}

#[derive(Deserialize)]
struct RawVerdict {
    id: String,
    status: SuggestedStatus,
    reason: String,
}

/// Parse and validate model output against the submitted batch
pub fn parse_verdicts(
    text: &str,
    inputs: &[ClassifierInput],
) -> Result<Vec<Verdict>, ClassifierError> {
    let start = text.find('[');
    let end = text.rfind(']');
    let slice = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(ClassifierError::parse("no JSON array in output", text)),
    };

    let value: serde_json::Value = serde_json::from_str(slice)
        .map_err(|e| ClassifierError::parse(e.to_string(), text))?;

    let raw: Vec<RawVerdict> =
        serde_json::from_value(value).map_err(|e| ClassifierError::schema(e.to_string(), text))?;

    if raw.iter().any(|v| v.reason.trim().is_empty()) {
        return Err(ClassifierError::schema("verdict with empty reason", text));
    }

    let submitted: HashSet<MessageId> = inputs.iter().map(|i| i.id).collect();
    let mut seen = HashSet::new();
    let mut verdicts = Vec::with_capacity(raw.len());

    for verdict in raw {
        let Ok(message_id) = verdict.id.trim().parse::<MessageId>() else {
            warn!(id = %verdict.id, "Discarding verdict with malformed id");
            continue;
        };
        if !submitted.contains(&message_id) {
            warn!(%message_id, "Discarding verdict for a message that was not submitted");
            continue;
        }
        if !seen.insert(message_id) {
            continue;
        }
        verdicts.push(Verdict {
            message_id,
            status: verdict.status,
            reason: verdict.reason.trim().to_string(),
        });
    }

    Ok(verdicts)
}
