//! Interactive follow-up on the analysis buttons.
//!
//! Each action runs to completion before the webhook is answered, so the
//! outcome (success or failure) is always posted back to the thread.

use super::blocks::{
    fix_result_blocks, ActionPayload, ACTION_CREATE_FIX_PR, ACTION_CREATE_ISSUE, STATUS_GENERATING,
    STATUS_NO_FIX, STATUS_PUBLISHING, STATUS_RESOLVING,
};
use super::{ChatClient, OutgoingMessage};
use crate::crash::CrashIssue;
use crate::github::{IssueDraft, IssueRef, PullRequest, SourceHost};
use crate::llm::DiagnosticEngine;
use crate::remediation::RemediationPublisher;
use crate::resolver::SourceResolver;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub actions: Vec<BlockAction>,
    #[serde(default)]
    pub channel: Option<IdRef>,
    #[serde(default)]
    pub message: Option<MessageRef>,
    #[serde(default)]
    pub user: Option<IdRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockAction {
    pub action_id: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

impl InteractionPayload {
    /// Decode the `payload` field of a form-encoded interaction request.
    pub fn from_form(body: &[u8]) -> Result<Self> {
        let raw = url::form_urlencoded::parse(body)
            .find(|(key, _)| key == "payload")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| anyhow::anyhow!("Interaction request has no payload field"))?;
        serde_json::from_str(&raw).context("Invalid interaction payload")
    }

    /// The thread to reply in: the clicked message's thread, or the message itself.
    pub fn thread_ts(&self) -> Option<&str> {
        let message = self.message.as_ref()?;
        message.thread_ts.as_deref().or(message.ts.as_deref())
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel.as_ref().map(|c| c.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Not a button action this service handles
    Ignored,
    IssueCreated(IssueRef),
    PullRequestOpened(PullRequest),
    /// The action ran and failed; the reason was posted to the thread
    Failed(String),
}

pub struct InteractionHandler {
    chat: Arc<dyn ChatClient>,
    host: Arc<dyn SourceHost>,
    resolver: Arc<SourceResolver>,
    engine: Arc<DiagnosticEngine>,
    publisher: Arc<RemediationPublisher>,
    issue_labels: Vec<String>,
    default_channel: String,
}

impl InteractionHandler {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        host: Arc<dyn SourceHost>,
        resolver: Arc<SourceResolver>,
        engine: Arc<DiagnosticEngine>,
        publisher: Arc<RemediationPublisher>,
        issue_labels: Vec<String>,
        default_channel: &str,
    ) -> Self {
        Self {
            chat,
            host,
            resolver,
            engine,
            publisher,
            issue_labels,
            default_channel: default_channel.to_string(),
        }
    }

    pub async fn handle(&self, payload: &InteractionPayload) -> Result<InteractionOutcome> {
        if payload.kind != "block_actions" {
            info!(kind = %payload.kind, "Ignoring non block_actions interaction");
            return Ok(InteractionOutcome::Ignored);
        }

        let Some(action) = payload.actions.first() else {
            return Ok(InteractionOutcome::Ignored);
        };
        let channel = payload.channel_id().unwrap_or(&self.default_channel);
        let Some(thread_ts) = payload.thread_ts() else {
            warn!(action = %action.action_id, "Interaction without a message, ignoring");
            return Ok(InteractionOutcome::Ignored);
        };

        info!(
            action = %action.action_id,
            channel,
            thread_ts,
            user = payload.user.as_ref().map(|u| u.id.as_str()).unwrap_or(""),
            "Handling interaction"
        );

        match action.action_id.as_str() {
            ACTION_CREATE_ISSUE => {
                let crash = ActionPayload::decode(&action.value)?;
                Ok(self.create_issue(channel, thread_ts, &crash).await)
            }
            ACTION_CREATE_FIX_PR => {
                let crash = ActionPayload::decode(&action.value)?;
                self.create_fix_pr(channel, thread_ts, &crash).await
            }
            other => {
                info!(action = other, "Unknown action, ignoring");
                Ok(InteractionOutcome::Ignored)
            }
        }
    }

    async fn reply(&self, channel: &str, thread_ts: &str, text: String) {
        let message = OutgoingMessage::new(channel, text).in_thread(thread_ts);
        if let Err(e) = self.chat.post_message(&message).await {
            error!(error = %e, "Failed to post interaction reply");
        }
    }

    async fn update(&self, channel: &str, ts: &str, text: &str) {
        if let Err(e) = self.chat.update_message(channel, ts, text, None).await {
            warn!(error = %e, "Failed to update status message");
        }
    }

    async fn create_issue(
        &self,
        channel: &str,
        thread_ts: &str,
        crash: &ActionPayload,
    ) -> InteractionOutcome {
        let draft = IssueDraft {
            title: format!("[Crash] {}", crash.title),
            body: issue_body(&crash.issue()),
            labels: self.issue_labels.clone(),
        };

        match self.host.create_issue(&draft).await {
            Ok(issue) => {
                info!(number = issue.number, url = %issue.html_url, "Tracking issue created");
                self.reply(
                    channel,
                    thread_ts,
                    format!(
                        "✅ GitHub issue created: <{}|#{} {}>",
                        issue.html_url, issue.number, issue.title
                    ),
                )
                .await;
                InteractionOutcome::IssueCreated(issue)
            }
            Err(e) => {
                error!(error = %e, "Tracking issue creation failed");
                let reason = e.to_string();
                self.reply(
                    channel,
                    thread_ts,
                    format!("❌ Failed to create GitHub issue: {}", reason),
                )
                .await;
                InteractionOutcome::Failed(reason)
            }
        }
    }

    async fn create_fix_pr(
        &self,
        channel: &str,
        thread_ts: &str,
        crash: &ActionPayload,
    ) -> Result<InteractionOutcome> {
        let status = OutgoingMessage::new(channel, STATUS_RESOLVING).in_thread(thread_ts);
        let status_ts = self
            .chat
            .post_message(&status)
            .await
            .context("Failed to post fix PR status message")?;

        let issue = crash.issue();
        let excerpts = self.resolver.resolve_all(&crash.locations()).await;
        info!(
            requested = crash.files.len(),
            resolved = excerpts.iter().filter(|e| e.is_resolved()).count(),
            "Re-resolved source for fix"
        );
        self.update(channel, &status_ts, STATUS_GENERATING).await;

        let Some(proposal) = self.engine.generate_fix(&issue, &excerpts).await else {
            error!("Fix generation produced nothing");
            self.update(channel, &status_ts, STATUS_NO_FIX).await;
            return Ok(InteractionOutcome::Failed(STATUS_NO_FIX.to_string()));
        };
        self.update(channel, &status_ts, STATUS_PUBLISHING).await;

        match self.publisher.publish(&issue, &proposal, &excerpts).await {
            Ok(pr) => {
                let blocks = fix_result_blocks(&pr, &proposal.fixes);
                let text = format!("✅ Fix PR created: #{}", pr.number);
                if let Err(e) = self
                    .chat
                    .update_message(channel, &status_ts, &text, Some(&blocks))
                    .await
                {
                    warn!(error = %e, "Failed to post fix PR result");
                }
                Ok(InteractionOutcome::PullRequestOpened(pr))
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                self.update(channel, &status_ts, &format!("❌ Fix PR failed: {}", reason))
                    .await;
                Ok(InteractionOutcome::Failed(reason))
            }
        }
    }
}

fn issue_body(issue: &CrashIssue) -> String {
    format!(
        r#"## Automated crash report

**Error:** `{}`
**Details:** `{}`
**App version:** {}

---

> This issue was created automatically by the crash triage bot.
> See the chat thread for the AI analysis."#,
        CrashIssue::or_na(&issue.title),
        CrashIssue::or_na(&issue.subtitle),
        CrashIssue::or_na(&issue.app_version)
    )
}
