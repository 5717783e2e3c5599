//! Block Kit message builders and the action-button payload.

use crate::crash::{CrashAlert, CrashIssue};
use crate::github::{PullRequest, SourceHost};
use crate::llm::ProposedFix;
use crate::parser::FileLocation;
use crate::resolver::SourceExcerpt;
use crate::util::truncate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Per-section text ceiling, kept under Slack's 3000 with some margin
pub const SECTION_TEXT_LIMIT: usize = 2900;
/// Ceiling on a button's `value`
pub const ACTION_VALUE_LIMIT: usize = 2000;

pub const ACTION_CREATE_ISSUE: &str = "create_github_issue";
pub const ACTION_CREATE_FIX_PR: &str = "create_fix_pr";

const ANALYSIS_UNAVAILABLE: &str = "The analysis could not be performed. Not enough data was available.";
const NO_SOURCE_CONTEXT: &str = "📭 No source file could be identified for this crash, so the analysis ran without source context.";

pub const STATUS_RESOLVING: &str = "🔄 Creating a fix PR...\n\n① Fetching source code...";
pub const STATUS_GENERATING: &str = "🔄 Creating a fix PR...\n\n① Fetching source code ✅\n② Generating a fix...";
pub const STATUS_PUBLISHING: &str = "🔄 Creating a fix PR...\n\n① Fetching source code ✅\n② Generating a fix ✅\n③ Creating branch and committing...";
pub const STATUS_NO_FIX: &str = "❌ Could not generate a fix. The source context was insufficient or the model call failed.";

/// Split text into chunks of at most `max_chars` characters, preferring
/// paragraph breaks, then line breaks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let boundary = match remaining.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };

        let region = &remaining[..boundary];
        let split_at = region
            .rfind("\n\n")
            .map(|p| p + 1)
            .or_else(|| region.rfind('\n'))
            .filter(|p| *p > 0)
            .unwrap_or(boundary);

        let (head, tail) = remaining.split_at(split_at);
        chunks.push(head.to_string());
        remaining = tail.trim_start_matches('\n');
    }

    chunks
}

/// File hint carried in the action payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFile {
    #[serde(alias = "file")]
    pub file_path: String,
    #[serde(default)]
    pub line: Option<u32>,
}

/// The JSON round-tripped through the analysis buttons. Holds hints only,
/// never file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub files: Vec<ActionFile>,
}

impl ActionPayload {
    pub fn new(issue: &CrashIssue, excerpts: &[SourceExcerpt]) -> Self {
        let title = if issue.title.trim().is_empty() {
            "Unknown crash".to_string()
        } else {
            issue.title.clone()
        };

        Self {
            id: issue.id.clone(),
            title,
            subtitle: issue.subtitle.clone(),
            app_version: issue.app_version.clone(),
            files: excerpts
                .iter()
                .filter_map(|e| {
                    e.resolved().map(|file| ActionFile {
                        file_path: file.path.clone(),
                        line: e.line(),
                    })
                })
                .collect(),
        }
    }

    pub fn issue(&self) -> CrashIssue {
        CrashIssue::new(&self.id, &self.title, &self.subtitle, &self.app_version)
    }

    pub fn locations(&self) -> Vec<FileLocation> {
        self.files
            .iter()
            .map(|f| FileLocation::new(f.file_path.clone(), f.line))
            .collect()
    }

    /// Serialize, shrinking until the value fits [`ACTION_VALUE_LIMIT`]:
    /// subtitle first, then trailing files, then the title.
    pub fn encode(&self) -> String {
        let mut payload = self.clone();
        let mut encoded = payload.to_json();

        if encoded.chars().count() > ACTION_VALUE_LIMIT {
            payload.subtitle = truncate(&payload.subtitle, 200);
            encoded = payload.to_json();
        }
        while encoded.chars().count() > ACTION_VALUE_LIMIT && !payload.files.is_empty() {
            payload.files.pop();
            encoded = payload.to_json();
        }
        if encoded.chars().count() > ACTION_VALUE_LIMIT {
            payload.title = truncate(&payload.title, 200);
            payload.id = truncate(&payload.id, 100);
            payload.app_version = truncate(&payload.app_version, 50);
            encoded = payload.to_json();
        }

        encoded
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn decode(value: &str) -> Result<Self> {
        serde_json::from_str(value).context("Invalid action payload")
    }
}

/// Link to a resolved file in the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLink {
    pub url: String,
    pub path: String,
    pub line: Option<u32>,
}

impl SourceLink {
    pub fn for_excerpts(host: &dyn SourceHost, branch: &str, excerpts: &[SourceExcerpt]) -> Vec<Self> {
        excerpts
            .iter()
            .filter_map(|e| {
                e.resolved().map(|file| SourceLink {
                    url: host.blob_url(branch, &file.path, e.line()),
                    path: file.path.clone(),
                    line: e.line(),
                })
            })
            .collect()
    }

    fn mrkdwn(&self) -> String {
        let line = self.line.map(|l| l.to_string()).unwrap_or_default();
        format!("<{}|{}:{}>", self.url, self.path, line)
    }
}

fn section(text: &str) -> Value {
    json!({"type": "section", "text": {"type": "mrkdwn", "text": text}})
}

fn context(text: &str) -> Value {
    json!({"type": "context", "elements": [{"type": "mrkdwn", "text": text}]})
}

fn divider() -> Value {
    json!({"type": "divider"})
}

/// Fallback text of the root alert message.
pub fn initial_alert_text(alert: &CrashAlert) -> String {
    format!(
        "{} {}: {}",
        alert.kind.emoji(),
        alert.label(),
        CrashIssue::or_na(&alert.issue.title)
    )
}

pub fn initial_alert_blocks(alert: &CrashAlert, console_url: &str) -> Value {
    let issue = &alert.issue;
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {"type": "plain_text", "text": truncate(&format!("{} {}", alert.kind.emoji(), alert.label()), 150), "emoji": true}
        }),
        json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Platform:*\n{}", alert.platform.label())},
                {"type": "mrkdwn", "text": format!("*App version:*\n{}", CrashIssue::or_na(&issue.app_version))}
            ]
        }),
        section(&truncate(
            &format!(
                "*Error:*\n`{}`\n*Details:*\n`{}`",
                CrashIssue::or_na(&issue.title),
                CrashIssue::or_na(&issue.subtitle)
            ),
            SECTION_TEXT_LIMIT,
        )),
        context("🤖 AI analysis in progress... results will be posted in this thread shortly."),
    ];

    if !console_url.trim().is_empty() {
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": {"type": "plain_text", "text": "Open in crash console"},
                "style": "danger",
                "url": console_url
            }]
        }));
    }

    Value::Array(blocks)
}

fn fix_pr_confirm() -> Value {
    json!({
        "title": {"type": "plain_text", "text": "Create a fix PR?"},
        "text": {"type": "mrkdwn", "text": "The model will generate a fix for this crash and open a pull request.\n\n⚠️ *Review the code before merging.*"},
        "confirm": {"type": "plain_text", "text": "Create PR"},
        "deny": {"type": "plain_text", "text": "Cancel"}
    })
}

/// Threaded analysis reply. The fix button is only added when `offer_fix`.
pub fn analysis_blocks(
    analysis: Option<&str>,
    links: &[SourceLink],
    had_hints: bool,
    action_value: &str,
    offer_fix: bool,
) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {"type": "plain_text", "text": "🤖 AI crash analysis", "emoji": true}
        }),
        divider(),
    ];

    let text = analysis
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(ANALYSIS_UNAVAILABLE);
    blocks.extend(chunk_text(text, SECTION_TEXT_LIMIT).iter().map(|c| section(c)));

    if !had_hints {
        blocks.push(context(NO_SOURCE_CONTEXT));
    }

    if !links.is_empty() {
        let list = links
            .iter()
            .map(SourceLink::mrkdwn)
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(divider());
        blocks.push(section(&truncate(
            &format!("📂 *Related source:*\n{}", list),
            SECTION_TEXT_LIMIT,
        )));
    }

    let mut actions = vec![json!({
        "type": "button",
        "text": {"type": "plain_text", "text": "🐛 Create GitHub issue"},
        "action_id": ACTION_CREATE_ISSUE,
        "value": action_value
    })];
    if offer_fix {
        actions.push(json!({
            "type": "button",
            "text": {"type": "plain_text", "text": "🔀 Create fix PR"},
            "style": "primary",
            "action_id": ACTION_CREATE_FIX_PR,
            "value": action_value,
            "confirm": fix_pr_confirm()
        }));
    }

    blocks.push(divider());
    blocks.push(json!({"type": "actions", "elements": actions}));

    Value::Array(blocks)
}

pub fn fix_result_blocks(pr: &PullRequest, fixes: &[ProposedFix]) -> Value {
    let summaries = fixes
        .iter()
        .map(|f| format!("• `{}`: {}", f.file_path, f.summary))
        .collect::<Vec<_>>()
        .join("\n");

    json!([
        section(&format!(
            "✅ *Fix PR created!*\n\n<{}|#{} {}>",
            pr.html_url, pr.number, pr.title
        )),
        divider(),
        section(&truncate(&format!("📝 *Changes:*\n{}", summaries), SECTION_TEXT_LIMIT)),
        context("⚠️ This code was generated automatically. Review it before merging.")
    ])
}

/// Collect the `action_id`s of every button in a block list.
pub fn action_ids(blocks: &Value) -> Vec<String> {
    blocks
        .as_array()
        .into_iter()
        .flatten()
        .filter(|b| b["type"] == "actions")
        .filter_map(|b| b["elements"].as_array())
        .flatten()
        .filter_map(|e| e["action_id"].as_str().map(str::to_string))
        .collect()
}
