//! Remediation publisher
//!
//! Turns a [`FixProposal`] into a pull request: fresh branch from the base
//! head, one commit per fix, PR, then labels. Any failure after the branch
//! exists deletes the branch before the error is returned.

use crate::crash::CrashIssue;
use crate::github::{FileCommit, PullRequest, PullRequestDraft, SourceHost};
use crate::llm::{FixProposal, ProposedFix};
use crate::resolver::SourceExcerpt;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

const MAX_BRANCH_ID_LEN: usize = 20;

/// `fix/crashlytics-<id>-<millis>`, keeping only ASCII alphanumerics of the id.
pub fn branch_name(issue_id: &str, timestamp_millis: i64) -> String {
    let id: String = issue_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_BRANCH_ID_LEN)
        .collect();
    let id = if id.is_empty() { "unknown".to_string() } else { id };
    format!("fix/crashlytics-{}-{}", id, timestamp_millis)
}

pub struct RemediationPublisher {
    host: Arc<dyn SourceHost>,
    base_branch: String,
    labels: Vec<String>,
}

impl RemediationPublisher {
    pub fn new(host: Arc<dyn SourceHost>, base_branch: &str, labels: Vec<String>) -> Self {
        Self {
            host,
            base_branch: base_branch.to_string(),
            labels,
        }
    }

    /// Publish `proposal` as a pull request against the base branch.
    pub async fn publish(
        &self,
        issue: &CrashIssue,
        proposal: &FixProposal,
        excerpts: &[SourceExcerpt],
    ) -> Result<PullRequest> {
        if proposal.fixes.is_empty() {
            anyhow::bail!("Fix proposal has no fixes");
        }

        let branch = branch_name(&issue.id, chrono::Utc::now().timestamp_millis());

        let base_sha = self
            .host
            .branch_head(&self.base_branch)
            .await
            .with_context(|| format!("Failed to read head of {}", self.base_branch))?;

        match self
            .create_branch_and_pr(&branch, &base_sha, issue, proposal, excerpts)
            .await
        {
            Ok(pr) => {
                self.attach_labels(pr.number).await;
                info!(number = pr.number, url = %pr.html_url, "Fix PR created");
                Ok(pr)
            }
            Err(e) => {
                error!(branch = %branch, error = %e, "Fix PR failed, removing branch");
                if let Err(cleanup) = self.host.delete_branch(&branch).await {
                    warn!(branch = %branch, error = %cleanup, "Branch cleanup failed");
                }
                Err(e)
            }
        }
    }

    async fn create_branch_and_pr(
        &self,
        branch: &str,
        base_sha: &str,
        issue: &CrashIssue,
        proposal: &FixProposal,
        excerpts: &[SourceExcerpt],
    ) -> Result<PullRequest> {
        self.host
            .create_branch(branch, base_sha)
            .await
            .with_context(|| format!("Failed to create branch {}", branch))?;
        info!(branch, "Fix branch created");

        for fix in &proposal.fixes {
            let sha = self.current_sha(fix, branch, excerpts).await;
            let commit = FileCommit {
                path: fix.file_path.clone(),
                message: commit_message(fix),
                content: fix.fixed_code.clone(),
                branch: branch.to_string(),
                sha,
            };
            self.host.put_file(&commit).await?;
            info!(path = %fix.file_path, "Committed fix");
        }

        let draft = PullRequestDraft {
            title: pr_title(issue, proposal),
            body: pr_body(issue, proposal),
            head: branch.to_string(),
            base: self.base_branch.clone(),
        };
        self.host
            .create_pull_request(&draft)
            .await
            .context("Failed to open pull request")
    }

    /// Blob hash for an update: from the resolved excerpt, else read on the
    /// new branch, else `None` to create the file.
    async fn current_sha(
        &self,
        fix: &ProposedFix,
        branch: &str,
        excerpts: &[SourceExcerpt],
    ) -> Option<String> {
        let known = excerpts
            .iter()
            .filter_map(SourceExcerpt::resolved)
            .find(|file| file.path == fix.file_path)
            .map(|file| file.sha.clone());
        if known.is_some() {
            return known;
        }

        match self.host.get_file(&fix.file_path, branch).await {
            Ok(Some(file)) => Some(file.sha),
            Ok(None) => {
                warn!(path = %fix.file_path, "File not on branch, creating it");
                None
            }
            Err(e) => {
                warn!(path = %fix.file_path, error = %e, "Could not read file hash, creating it");
                None
            }
        }
    }

    async fn attach_labels(&self, number: u64) {
        if self.labels.is_empty() {
            return;
        }
        if let Err(e) = self.host.add_labels(number, &self.labels).await {
            warn!(number, error = %e, "Failed to label PR (labels may not exist)");
        }
    }
}

fn commit_message(fix: &ProposedFix) -> String {
    if fix.summary.trim().is_empty() {
        format!("fix: update {}", fix.file_path)
    } else {
        format!("fix: {}", fix.summary.trim())
    }
}

fn pr_title(issue: &CrashIssue, proposal: &FixProposal) -> String {
    match proposal.pr_title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => format!("[Crash Fix] {}", CrashIssue::or_na(&issue.title)),
    }
}

fn pr_body(issue: &CrashIssue, proposal: &FixProposal) -> String {
    let summaries = proposal
        .fixes
        .iter()
        .map(|fix| format!("- `{}`: {}", fix.file_path, fix.summary))
        .collect::<Vec<_>>()
        .join("\n");

    let description = proposal
        .pr_description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("Generated from the automated root-cause analysis of this crash.");

    format!(
        r#"## 🤖 Automated crash fix

### Crash
- **Error:** `{title}`
- **Details:** `{subtitle}`
- **App version:** {version}

### Changes
{summaries}

### Description
{description}

---

> ⚠️ **This pull request was generated automatically.** Review the code carefully before merging."#,
        title = CrashIssue::or_na(&issue.title),
        subtitle = CrashIssue::or_na(&issue.subtitle),
        version = CrashIssue::or_na(&issue.app_version),
        summaries = summaries,
        description = description,
    )
}
