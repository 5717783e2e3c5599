//! In-memory fakes for the external services.
//!
//! Each fake records its calls so tests can assert on call counts and order,
//! and can be told to fail specific operations.

use crate::github::{
    CommitSummary, FileCommit, IssueDraft, IssueRef, PullRequest, PullRequestDraft, RemoteFile,
    SourceHost,
};
use crate::llm::{Completion, ReasoningModel};
use crate::slack::{ChatClient, OutgoingMessage};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Source host
// ============================================================================

/// Repository fake. Files are shared across refs; `put_file` writes them.
///
/// Call log entries start with the operation name (`get_file`, `search`,
/// `tree`, `commits`, `head`, `create_branch`, `delete_branch`, `put_file`,
/// `create_pr`, `labels`, `create_issue`), which is also the key used by
/// [`FakeSourceHost::failing`].
#[derive(Default)]
pub struct FakeSourceHost {
    files: Mutex<HashMap<String, RemoteFile>>,
    search: HashMap<String, Vec<String>>,
    tree: Vec<String>,
    commits: Vec<CommitSummary>,
    failures: Mutex<HashMap<&'static str, usize>>,
    calls: Mutex<Vec<String>>,
    pull_requests: Mutex<Vec<PullRequestDraft>>,
}

impl FakeSourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files.lock().unwrap().insert(
            path.to_string(),
            RemoteFile {
                path: path.to_string(),
                content: content.to_string(),
                sha: format!("sha-{}", path),
            },
        );
        self
    }

    pub fn with_search(mut self, file_name: &str, paths: &[&str]) -> Self {
        self.search.insert(
            file_name.to_string(),
            paths.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_tree(mut self, paths: &[&str]) -> Self {
        self.tree = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_commits(mut self, commits: &[(&str, &str, &str)]) -> Self {
        self.commits = commits
            .iter()
            .map(|(subject, author, date)| CommitSummary {
                subject: subject.to_string(),
                author: author.to_string(),
                date: date.to_string(),
            })
            .collect();
        self
    }

    /// Make every call to `op` fail.
    pub fn failing(self, op: &'static str) -> Self {
        self.failing_times(op, usize::MAX)
    }

    /// Make the next `times` calls to `op` fail.
    pub fn failing_times(self, op: &'static str, times: usize) -> Self {
        self.failures.lock().unwrap().insert(op, times);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of logged calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn last_pull_request(&self) -> Option<PullRequestDraft> {
        self.pull_requests.lock().unwrap().last().cloned()
    }

    fn record(&self, op: &'static str, detail: String) -> Result<()> {
        let entry = if detail.is_empty() {
            op.to_string()
        } else {
            format!("{} {}", op, detail)
        };
        self.calls.lock().unwrap().push(entry);

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(op) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                anyhow::bail!("fake {} failure", op);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    async fn get_file(&self, path: &str, git_ref: &str) -> Result<Option<RemoteFile>> {
        self.record("get_file", format!("{}@{}", path, git_ref))?;
        Ok(self.file(path))
    }

    async fn search_file(&self, file_name: &str) -> Result<Vec<String>> {
        self.record("search", file_name.to_string())?;
        Ok(self.search.get(file_name).cloned().unwrap_or_default())
    }

    async fn list_blob_paths(&self, branch: &str) -> Result<Vec<String>> {
        self.record("tree", branch.to_string())?;
        Ok(self.tree.clone())
    }

    async fn recent_commits(&self, path: &str, limit: usize) -> Result<Vec<CommitSummary>> {
        self.record("commits", path.to_string())?;
        Ok(self.commits.iter().take(limit).cloned().collect())
    }

    async fn branch_head(&self, branch: &str) -> Result<String> {
        self.record("head", branch.to_string())?;
        Ok("head-sha".to_string())
    }

    async fn create_branch(&self, branch: &str, from_sha: &str) -> Result<()> {
        self.record("create_branch", format!("{} {}", branch, from_sha))
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.record("delete_branch", branch.to_string())
    }

    async fn put_file(&self, commit: &FileCommit) -> Result<()> {
        self.record(
            "put_file",
            format!(
                "{} sha={}",
                commit.path,
                commit.sha.as_deref().unwrap_or("none")
            ),
        )?;
        self.files.lock().unwrap().insert(
            commit.path.clone(),
            RemoteFile {
                path: commit.path.clone(),
                content: commit.content.clone(),
                sha: format!("sha-{}-{}", commit.path, commit.branch),
            },
        );
        Ok(())
    }

    async fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest> {
        self.record("create_pr", format!("{} -> {}", draft.head, draft.base))?;
        self.pull_requests.lock().unwrap().push(draft.clone());
        Ok(PullRequest {
            number: 42,
            html_url: "https://github.test/acme/app/pull/42".to_string(),
            title: draft.title.clone(),
        })
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<()> {
        self.record("labels", format!("{} {}", issue_number, labels.join(",")))
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<IssueRef> {
        self.record(
            "create_issue",
            format!("{} labels={}", draft.title, draft.labels.join(",")),
        )?;
        Ok(IssueRef {
            number: 7,
            html_url: "https://github.test/acme/app/issues/7".to_string(),
            title: draft.title.clone(),
        })
    }

    fn blob_url(&self, branch: &str, path: &str, line: Option<u32>) -> String {
        format!(
            "https://github.test/acme/app/blob/{}/{}#L{}",
            branch,
            path,
            line.unwrap_or(1)
        )
    }
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpdate {
    pub channel: String,
    pub ts: String,
    pub text: String,
    pub blocks: Option<Value>,
}

#[derive(Default)]
pub struct FakeChat {
    posted: Mutex<Vec<OutgoingMessage>>,
    updates: Mutex<Vec<RecordedUpdate>>,
    reactions: Mutex<Vec<(String, String, String)>>,
    fail_posts: bool,
    fail_reactions: bool,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_posts(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    pub fn failing_reactions(mut self) -> Self {
        self.fail_reactions = true;
        self
    }

    /// Successfully posted messages, in order.
    pub fn posted(&self) -> Vec<OutgoingMessage> {
        self.posted.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Timestamp handed out for the `index`-th posted message.
    pub fn ts_of(&self, index: usize) -> String {
        format!("1700000000.{:06}", index + 1)
    }

    pub fn reaction_attempts(&self) -> usize {
        self.reactions.lock().unwrap().len()
    }

    pub fn reactions(&self) -> Vec<(String, String, String)> {
        self.reactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<String> {
        if self.fail_posts {
            anyhow::bail!("Slack API chat.postMessage failed: channel_not_found");
        }
        let mut posted = self.posted.lock().unwrap();
        posted.push(message.clone());
        Ok(self.ts_of(posted.len() - 1))
    }

    async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<&Value>,
    ) -> Result<()> {
        self.updates.lock().unwrap().push(RecordedUpdate {
            channel: channel.to_string(),
            ts: ts.to_string(),
            text: text.to_string(),
            blocks: blocks.cloned(),
        });
        Ok(())
    }

    async fn add_reaction(&self, channel: &str, ts: &str, name: &str) -> Result<()> {
        self.reactions.lock().unwrap().push((
            channel.to_string(),
            ts.to_string(),
            name.to_string(),
        ));
        if self.fail_reactions {
            anyhow::bail!("Slack API reactions.add failed: already_reacted");
        }
        Ok(())
    }
}

// ============================================================================
// Reasoning model
// ============================================================================

/// Model fake answering from a script. An exhausted script is an error.
#[derive(Default)]
pub struct FakeModel {
    script: Mutex<VecDeque<std::result::Result<Completion, String>>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.completion(Completion::text(text))
    }

    pub fn completion(self, completion: Completion) -> Self {
        self.script.lock().unwrap().push_back(Ok(completion));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    /// `(prompt, max_tokens)` per call.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningModel for FakeModel {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), max_tokens));
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(completion)) => Ok(completion),
            Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
            None => Err(anyhow::anyhow!("no scripted model response")),
        }
    }
}
