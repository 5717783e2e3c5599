use super::models::{Completion, Usage};
use super::ReasoningModel;
use crate::util::{sanitize_error_body, truncate_str};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client for Anthropic models.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str, api_base: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: format!("{}/v1/messages", api_base.trim_end_matches('/')),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn into_completion(self) -> Completion {
        let text = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Completion {
            text,
            truncated: self.stop_reason.as_deref() == Some("max_tokens"),
            usage: self.usage,
        }
    }
}

fn status_error(status: reqwest::StatusCode, text: &str) -> anyhow::Error {
    let error_msg = match status.as_u16() {
        401 => "Invalid model API key. Check ANTHROPIC_API_KEY.".to_string(),
        429 => "Rate limited by the model API. Try again in a few minutes.".to_string(),
        529 => "Model API is overloaded. Try again shortly.".to_string(),
        500..=599 => format!(
            "Model API server error ({}). The service may be temporarily unavailable.",
            status
        ),
        _ => format!(
            "API error {}: {}",
            status,
            sanitize_error_body(truncate_str(text, 200))
        ),
    };
    anyhow::anyhow!("{}", error_msg)
}

#[async_trait]
impl ReasoningModel for AnthropicClient {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .context("Failed to reach the model API")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read model API response")?;

        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow::anyhow!(
                "Failed to parse model API response: {}\n{}",
                e,
                truncate_str(&text, 200)
            )
        })?;

        let completion = parsed.into_completion();
        debug!(
            chars = completion.text.len(),
            truncated = completion.truncated,
            "Model completion received"
        );
        Ok(completion)
    }
}
