//! Native GitHub REST API client
//!
//! Reads repository content for the resolver and performs the branch,
//! commit, pull-request and issue operations used by remediation.

use super::{
    CommitSummary, FileCommit, IssueDraft, IssueRef, PullRequest, PullRequestDraft, RemoteFile,
    SourceHost,
};
use crate::util::sanitize_error_body;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const API_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = "crash-triage";
const API_VERSION: &str = "2022-11-28";
const SEARCH_PER_PAGE: &str = "3";

/// GitHub client bound to a single repository.
pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
    api_base: Url,
    web_base: String,
}

impl GitHubClient {
    pub fn new(token: &str, owner: &str, repo: &str, api_base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        let api_base = Url::parse(api_base)
            .with_context(|| format!("Invalid GitHub API base URL: {}", api_base))?;

        Ok(Self {
            http,
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            web_base: web_base_for(&api_base),
            api_base,
        })
    }

    /// `{api_base}/repos/{owner}/{repo}/{segments...}`
    fn repo_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API base URL cannot be a base"))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(api_error(resp).await)
        }
    }
}

fn web_base_for(api_base: &Url) -> String {
    match api_base.host_str() {
        Some("api.github.com") | None => "https://github.com".to_string(),
        Some(host) => format!("{}://{}", api_base.scheme(), host),
    }
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Turn a non-success response into an error, preferring GitHub's
/// structured `{message, errors}` body.
async fn api_error(resp: Response) -> anyhow::Error {
    let status = resp.status();
    let error_body = resp.text().await.unwrap_or_default();
    format_api_error(status, &error_body)
}

fn format_api_error(status: StatusCode, error_body: &str) -> anyhow::Error {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(error_body) {
        let detail = api_error
            .errors
            .first()
            .and_then(|e| e.message.clone())
            .unwrap_or_default();

        let msg = if detail.is_empty() {
            api_error.message
        } else {
            format!("{}: {}", api_error.message, detail)
        };

        return anyhow::anyhow!("GitHub API error: {}", msg);
    }

    let sanitized = sanitize_error_body(error_body);
    anyhow::anyhow!("GitHub API error ({}): {}", status, sanitized)
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct ContentResponse {
    path: String,
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    path: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct CommitAuthor {
    name: Option<String>,
    date: Option<String>,
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct CreatePrRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Serialize)]
struct AddLabelsRequest<'a> {
    labels: &'a [String],
}

fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .context("Failed to decode base64 file content")?;
    String::from_utf8(bytes).context("File content is not valid UTF-8")
}

impl CommitEntry {
    fn into_summary(self) -> CommitSummary {
        let subject = self.commit.message.lines().next().unwrap_or("").to_string();
        let (author, date) = match self.commit.author {
            Some(a) => (
                a.name.unwrap_or_else(|| "unknown".to_string()),
                a.date.unwrap_or_default(),
            ),
            None => ("unknown".to_string(), String::new()),
        };
        CommitSummary {
            subject,
            author,
            date: date.chars().take(10).collect(),
        }
    }
}

// ============================================================================
// SourceHost implementation
// ============================================================================

#[async_trait]
impl SourceHost for GitHubClient {
    async fn get_file(&self, path: &str, git_ref: &str) -> Result<Option<RemoteFile>> {
        let mut url = self.repo_url(std::iter::once("contents").chain(path.split('/')))?;
        url.query_pairs_mut().append_pair("ref", git_ref);

        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .context("Failed to send file content request")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        let body: ContentResponse = resp
            .json()
            .await
            .context("Failed to parse file content response")?;

        if body.encoding.as_deref().is_some_and(|e| e != "base64") {
            anyhow::bail!("Unsupported content encoding for {}", body.path);
        }
        let content = match body.content.as_deref() {
            Some(encoded) => decode_content(encoded)?,
            None => anyhow::bail!("{} is not a file", body.path),
        };

        Ok(Some(RemoteFile {
            path: body.path,
            content,
            sha: body.sha,
        }))
    }

    async fn search_file(&self, file_name: &str) -> Result<Vec<String>> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API base URL cannot be a base"))?
            .pop_if_empty()
            .extend(["search", "code"]);
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("filename:{} repo:{}/{}", file_name, self.owner, self.repo),
            )
            .append_pair("per_page", SEARCH_PER_PAGE);

        let resp = self
            .send(self.request(Method::GET, url), "code search")
            .await?;
        let body: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse code search response")?;

        Ok(body.items.into_iter().map(|item| item.path).collect())
    }

    async fn list_blob_paths(&self, branch: &str) -> Result<Vec<String>> {
        let head = self.branch_head(branch).await?;

        let mut url = self.repo_url(["git", "trees", head.as_str()])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let resp = self.send(self.request(Method::GET, url), "tree").await?;
        let body: TreeResponse = resp.json().await.context("Failed to parse tree response")?;

        if body.truncated {
            debug!(branch, "Repository tree listing was truncated by GitHub");
        }

        Ok(body
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    async fn recent_commits(&self, path: &str, limit: usize) -> Result<Vec<CommitSummary>> {
        let mut url = self.repo_url(["commits"])?;
        url.query_pairs_mut()
            .append_pair("path", path)
            .append_pair("per_page", &limit.to_string());

        let resp = self
            .send(self.request(Method::GET, url), "commit history")
            .await?;
        let entries: Vec<CommitEntry> = resp
            .json()
            .await
            .context("Failed to parse commit history response")?;

        Ok(entries
            .into_iter()
            .take(limit)
            .map(CommitEntry::into_summary)
            .collect())
    }

    async fn branch_head(&self, branch: &str) -> Result<String> {
        let url = self.repo_url(["git", "ref", "heads"].into_iter().chain(branch.split('/')))?;
        let resp = self.send(self.request(Method::GET, url), "branch ref").await?;
        let body: RefResponse = resp.json().await.context("Failed to parse ref response")?;
        Ok(body.object.sha)
    }

    async fn create_branch(&self, branch: &str, from_sha: &str) -> Result<()> {
        let url = self.repo_url(["git", "refs"])?;
        let request = CreateRefRequest {
            git_ref: format!("refs/heads/{}", branch),
            sha: from_sha,
        };
        self.send(
            self.request(Method::POST, url).json(&request),
            "branch creation",
        )
        .await?;
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<()> {
        let url = self.repo_url(["git", "refs", "heads"].into_iter().chain(branch.split('/')))?;
        self.send(self.request(Method::DELETE, url), "branch deletion")
            .await?;
        Ok(())
    }

    async fn put_file(&self, commit: &FileCommit) -> Result<()> {
        let url = self.repo_url(std::iter::once("contents").chain(commit.path.split('/')))?;
        let request = PutContentRequest {
            message: &commit.message,
            content: BASE64.encode(commit.content.as_bytes()),
            branch: &commit.branch,
            sha: commit.sha.as_deref(),
        };
        self.send(self.request(Method::PUT, url).json(&request), "file commit")
            .await
            .with_context(|| format!("Failed to commit {}", commit.path))?;
        Ok(())
    }

    async fn create_pull_request(&self, draft: &PullRequestDraft) -> Result<PullRequest> {
        let url = self.repo_url(["pulls"])?;
        let request = CreatePrRequest {
            title: &draft.title,
            body: &draft.body,
            head: &draft.head,
            base: &draft.base,
        };
        let resp = self
            .send(self.request(Method::POST, url).json(&request), "PR creation")
            .await?;
        resp.json().await.context("Failed to parse PR response")
    }

    async fn add_labels(&self, issue_number: u64, labels: &[String]) -> Result<()> {
        let number = issue_number.to_string();
        let url = self.repo_url(["issues", number.as_str(), "labels"])?;
        self.send(
            self.request(Method::POST, url)
                .json(&AddLabelsRequest { labels }),
            "label",
        )
        .await?;
        Ok(())
    }

    async fn create_issue(&self, draft: &IssueDraft) -> Result<IssueRef> {
        let url = self.repo_url(["issues"])?;
        let request = CreateIssueRequest {
            title: &draft.title,
            body: &draft.body,
            labels: &draft.labels,
        };
        let resp = self
            .send(
                self.request(Method::POST, url).json(&request),
                "issue creation",
            )
            .await?;
        resp.json().await.context("Failed to parse issue response")
    }

    fn blob_url(&self, branch: &str, path: &str, line: Option<u32>) -> String {
        format!(
            "{}/{}/{}/blob/{}/{}#L{}",
            self.web_base,
            self.owner,
            self.repo,
            branch,
            path,
            line.unwrap_or(1)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
