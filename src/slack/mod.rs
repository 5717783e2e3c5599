//! Chat notification channel
//!
//! [`ChatClient`] is the messaging seam, implemented for the Slack Web API
//! by [`SlackClient`]. [`Notifier`] posts the two phases of a crash report:
//! the root alert and the threaded analysis. [`InteractionHandler`] serves
//! the buttons attached to that analysis.

mod blocks;
mod client;
mod interaction;
mod signature;

pub use blocks::{
    action_ids, analysis_blocks, chunk_text, fix_result_blocks, initial_alert_blocks,
    initial_alert_text, ActionFile, ActionPayload, SourceLink, ACTION_CREATE_FIX_PR,
    ACTION_CREATE_ISSUE, ACTION_VALUE_LIMIT, SECTION_TEXT_LIMIT,
};
pub use client::SlackClient;
pub use interaction::{InteractionHandler, InteractionOutcome, InteractionPayload};
pub use signature::{verify_signature, MAX_REQUEST_AGE_SECS};

#[cfg(test)]
pub(crate) use signature::sign;

use crate::crash::{CrashAlert, CrashIssue};
use crate::resolver::{any_resolved, SourceExcerpt};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, warn};

/// Reaction added to the root message once the analysis is posted
pub const DONE_REACTION: &str = "white_check_mark";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl OutgoingMessage {
    pub fn new(channel: &str, text: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            text: text.into(),
            blocks: None,
            thread_ts: None,
        }
    }

    pub fn with_blocks(mut self, blocks: Value) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub fn in_thread(mut self, thread_ts: &str) -> Self {
        self.thread_ts = Some(thread_ts.to_string());
        self
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message and return its timestamp id.
    async fn post_message(&self, message: &OutgoingMessage) -> Result<String>;

    /// Replace the text (and optionally the blocks) of an existing message.
    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<&Value>,
    ) -> Result<()>;

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<()>;
}

pub struct Notifier {
    chat: Arc<dyn ChatClient>,
    channel: String,
    console_url: String,
}

impl Notifier {
    pub fn new(chat: Arc<dyn ChatClient>, channel: &str, console_url: &str) -> Self {
        Self {
            chat,
            channel: channel.to_string(),
            console_url: console_url.to_string(),
        }
    }

    /// Post the root alert; its timestamp anchors the thread.
    pub async fn post_initial_alert(&self, alert: &CrashAlert) -> Result<String> {
        let message = OutgoingMessage::new(&self.channel, initial_alert_text(alert))
            .with_blocks(initial_alert_blocks(alert, &self.console_url));
        self.chat.post_message(&message).await
    }

    /// Post the analysis reply and mark the root message done. Returns
    /// whether the fix button was offered.
    pub async fn post_analysis(
        &self,
        thread_ts: &str,
        issue: &CrashIssue,
        analysis: Option<&str>,
        excerpts: &[SourceExcerpt],
        links: &[SourceLink],
    ) -> Result<bool> {
        let offer_fix = any_resolved(excerpts);
        let action_value = ActionPayload::new(issue, excerpts).encode();
        let blocks = analysis_blocks(
            analysis,
            links,
            !excerpts.is_empty(),
            &action_value,
            offer_fix,
        );

        let message = OutgoingMessage::new(&self.channel, "AI crash analysis")
            .with_blocks(blocks)
            .in_thread(thread_ts);
        self.chat.post_message(&message).await?;

        if let Err(e) = self
            .chat
            .add_reaction(&self.channel, thread_ts, DONE_REACTION)
            .await
        {
            warn!(error = %e, "Failed to add completion reaction");
        }

        Ok(offer_fix)
    }

    /// Best-effort threaded error notice.
    pub async fn post_failure(&self, thread_ts: &str, error_text: &str) {
        let message = OutgoingMessage::new(
            &self.channel,
            format!(
                "❌ The AI analysis failed: {}\n\nPlease check this crash manually.",
                error_text
            ),
        )
        .in_thread(thread_ts);

        if let Err(e) = self.chat.post_message(&message).await {
            error!(error = %e, "Failed to post the failure notice");
        }
    }
}
