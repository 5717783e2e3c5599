use super::{ChatClient, OutgoingMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const API_TIMEOUT_SECS: u64 = 30;

/// Slack Web API client authenticated with a bot token.
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl SlackClient {
    pub fn new(bot_token: &str, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            bot_token: bot_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Make a POST Slack API call with a JSON body.
    async fn slack_api_post(&self, method: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.api_base, method);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bot_token))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Slack API {} request failed", method))?;
        let result: Value = resp
            .json()
            .await
            .with_context(|| format!("Slack API {} returned invalid JSON", method))?;
        check_ok(method, result)
    }
}

fn check_ok(method: &str, result: Value) -> Result<Value> {
    if result.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        let error = result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        anyhow::bail!("Slack API {} failed: {}", method, error);
    }
    Ok(result)
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<String> {
        let body = serde_json::to_value(message).context("Failed to encode Slack message")?;
        let result = self.slack_api_post("chat.postMessage", &body).await?;
        result
            .get("ts")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Slack API chat.postMessage returned no ts"))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<&Value>,
    ) -> Result<()> {
        let mut body = json!({
            "channel": channel,
            "ts": ts,
            "text": text,
        });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks.clone();
        }
        self.slack_api_post("chat.update", &body).await?;
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<()> {
        let body = json!({
            "channel": channel,
            "timestamp": ts,
            "name": name,
        });
        self.slack_api_post("reactions.add", &body).await?;
        Ok(())
    }
}
