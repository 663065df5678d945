//! Anthropic Messages API classifier
//!
//! See: https://docs.anthropic.com/en/api/messages

use super::{build_prompt, parse_verdicts, ClassifierError, ClassifierInput, ContentClassifier, Verdict, SYSTEM_PROMPT};
use async_trait::async_trait;
use botsentry_common::config::ClassifierConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage>,
}

#[derive(Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Classifier backed by the Anthropic Messages API
pub struct AnthropicClassifier {
    config: ClassifierConfig,
    client: Client,
}

impl AnthropicClassifier {
    /// Create a new classifier
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifierError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Whether an API key is available
    pub fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[async_trait]
impl ContentClassifier for AnthropicClassifier {
    async fn classify(&self, inputs: &[ClassifierInput]) -> Result<Vec<Verdict>, ClassifierError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => key,
            _ => {
                return Err(ClassifierError::NotConfigured(
                    "no API key (set classifier.api_key or ANTHROPIC_API_KEY)".to_string(),
                ))
            }
        };

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![RequestMessage {
                role: "user",
                content: build_prompt(inputs, self.config.max_body_chars),
            }],
        };

        debug!(url = %url, batch = inputs.len(), model = %self.config.model, "Calling classifier");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Classifier request failed: {}", e);
                ClassifierError::Http(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                status,
                body: botsentry_storage::models::truncate_chars(&body, super::RAW_SNIPPET_CHARS),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClassifierError::Http(e.to_string()))?;

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| ClassifierError::Parse {
            message: format!("invalid Messages API response: {}", e),
            raw: botsentry_storage::models::truncate_chars(&body, super::RAW_SNIPPET_CHARS),
        })?;

        let text = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or(ClassifierError::NoText)?;

        parse_verdicts(&text, inputs)
    }
}
