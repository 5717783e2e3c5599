//! Source hosting integration
//!
//! [`SourceHost`] is the seam the resolver, publisher and interaction
//! handler talk to. [`GitHubClient`] implements it against the GitHub REST
//! API; tests substitute an in-memory fake.

mod client;

pub use client::GitHubClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A file read from the repository at some ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub content: String,
    /// Blob hash, required to update the file later
    pub sha: String,
}

/// One entry of a file's recent history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// First line of the commit message
    pub subject: String,
    pub author: String,
    /// `YYYY-MM-DD`
    pub date: String,
}

impl CommitSummary {
    pub fn render(&self) -> String {
        format!("- {} ({}, {})", self.subject, self.author, self.date)
    }
}

/// Create-or-update of a single file on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    pub path: String,
    pub message: String,
    pub content: String,
    pub branch: String,
    /// Current blob hash; `None` creates the file
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDraft {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub html_url: String,
    pub title: String,
}

/// Operations the crash pipeline needs from a hosted repository.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Read a file. `Ok(None)` means the path does not exist at `git_ref`.
    async fn get_file(&self, path: &str, git_ref: &str) -> Result<Option<RemoteFile>>;

    /// Code-search the repository for a file name, best-ranked paths first.
    async fn search_file(&self, file_name: &str) -> Result<Vec<String>>;

    /// Every blob path on `branch`, recursively.
    async fn list_blob_paths(&self, branch: &str) -> Result<Vec<String>>;

    /// Most recent commits touching `path`, newest first.
    async fn recent_commits(&self, path: &str, limit: usize) -> Result<Vec<CommitSummary>>;

    /// Commit hash at the tip of `branch`.
    async fn branch_head(&self, branch: &str) -> Result<String>;

    async fn create_branch(&self, branch: &str, from_sha: &str) -> Result<()>;

    async fn delete_branch(&self, branch: &str) -> Result<()>;

    async fn put_file(&self, commit: &FileCommit) -> Result<()>;

    async fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest>;

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<()>;

    async fn create_issue(&self, draft: &IssueDraft) -> Result<IssueRef>;

    /// Browser link to a file on `branch`, anchored at `line` when known.
    fn blob_url(&self, branch: &str, path: &str, line: Option<u32>) -> String;
}
