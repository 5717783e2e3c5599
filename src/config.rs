//! Configuration management for crash-triage
//!
//! Settings live in ~/.config/crash-triage/config.toml. Secrets never do;
//! they are read from the environment only.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::llm::DEFAULT_MODEL;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub slack: SlackConfig,
    pub model: ModelConfig,
    pub alerts: AlertsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    pub default_branch: String,
    pub api_base: String,
    /// Extension of the app's source files, without the dot
    pub source_extension: String,
    pub tree_cache_ttl_secs: u64,
    pub pr_labels: Vec<String>,
    pub issue_labels: Vec<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            default_branch: "main".to_string(),
            api_base: "https://api.github.com".to_string(),
            source_extension: "swift".to_string(),
            tree_cache_ttl_secs: 300,
            pr_labels: labels(&["bug", "crashlytics", "ai-fix"]),
            issue_labels: labels(&["bug", "crashlytics", "auto-generated"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub channel_id: String,
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            api_base: "https://slack.com/api".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub api_base: String,
    pub analysis_max_tokens: u32,
    pub fix_max_tokens: u32,
    pub analysis_retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            analysis_max_tokens: 2048,
            fix_max_tokens: 16384,
            analysis_retry_delay_secs: 5,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Link behind the "open console" button; empty hides the button
    pub console_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Wall-clock budget for one webhook invocation
    pub invocation_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            invocation_timeout_secs: 300,
        }
    }
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

const MAX_OUTPUT_TOKENS: u32 = 64_000;
const MAX_TIMEOUT_SECS: u64 = 3600;

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("crash-triage"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Load config from `path`, else the default location, else defaults.
    ///
    /// An explicit path must exist. A missing default file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default().sanitized()),
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config.sanitized())
    }

    /// Trim strings and put zero or absurd numbers back to their defaults.
    pub fn sanitized(mut self) -> Self {
        let gh_defaults = GitHubConfig::default();
        let model_defaults = ModelConfig::default();
        let server_defaults = ServerConfig::default();
        let slack_defaults = SlackConfig::default();

        let gh = &mut self.github;
        trim(&mut gh.owner);
        trim(&mut gh.repo);
        or_default(&mut gh.default_branch, &gh_defaults.default_branch);
        or_default(&mut gh.api_base, &gh_defaults.api_base);
        gh.source_extension = gh.source_extension.trim().trim_start_matches('.').to_string();
        if gh.source_extension.is_empty() {
            gh.source_extension = gh_defaults.source_extension;
        }
        if gh.tree_cache_ttl_secs == 0 || gh.tree_cache_ttl_secs > MAX_TIMEOUT_SECS {
            warn!(value = gh.tree_cache_ttl_secs, "tree_cache_ttl_secs out of range, using default");
            gh.tree_cache_ttl_secs = gh_defaults.tree_cache_ttl_secs;
        }
        gh.pr_labels = clean_labels(&gh.pr_labels);
        gh.issue_labels = clean_labels(&gh.issue_labels);

        trim(&mut self.slack.channel_id);
        or_default(&mut self.slack.api_base, &slack_defaults.api_base);

        let model = &mut self.model;
        or_default(&mut model.name, &model_defaults.name);
        or_default(&mut model.api_base, &model_defaults.api_base);
        if model.analysis_max_tokens == 0 || model.analysis_max_tokens > MAX_OUTPUT_TOKENS {
            model.analysis_max_tokens = model_defaults.analysis_max_tokens;
        }
        if model.fix_max_tokens == 0 || model.fix_max_tokens > MAX_OUTPUT_TOKENS {
            model.fix_max_tokens = model_defaults.fix_max_tokens;
        }
        if model.analysis_retry_delay_secs > 60 {
            model.analysis_retry_delay_secs = model_defaults.analysis_retry_delay_secs;
        }
        if model.request_timeout_secs == 0 || model.request_timeout_secs > MAX_TIMEOUT_SECS {
            model.request_timeout_secs = model_defaults.request_timeout_secs;
        }

        trim(&mut self.alerts.console_url);

        or_default(&mut self.server.bind, &server_defaults.bind);
        if self.server.invocation_timeout_secs == 0
            || self.server.invocation_timeout_secs > MAX_TIMEOUT_SECS
        {
            self.server.invocation_timeout_secs = server_defaults.invocation_timeout_secs;
        }

        self
    }

    /// Every missing required field, in one message.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.github.owner.is_empty() {
            missing.push("github.owner");
        }
        if self.github.repo.is_empty() {
            missing.push("github.repo");
        }
        if self.slack.channel_id.is_empty() {
            missing.push("slack.channel_id");
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required config: {} (config file: {})",
                missing.join(", "),
                Self::config_location()
            );
        }
        Ok(())
    }

    pub fn tree_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.github.tree_cache_ttl_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.server.invocation_timeout_secs)
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/crash-triage/config.toml".to_string())
    }
}

fn trim(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn or_default(value: &mut String, default: &str) {
    trim(value);
    if value.is_empty() {
        *value = default.to_string();
    }
}

fn clean_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        if !out.iter().any(|existing| existing == label) {
            out.push(label.to_string());
        }
    }
    out
}

/// Credentials, read from the environment only.
#[derive(Clone)]
pub struct Secrets {
    pub slack_bot_token: String,
    pub github_token: String,
    pub anthropic_api_key: String,
    /// Enables interaction request verification when present
    pub slack_signing_secret: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("slack_signing_secret", &self.slack_signing_secret.is_some())
            .finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut missing = Vec::new();
        let mut required = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };
        let slack_bot_token = required("SLACK_BOT_TOKEN");
        let github_token = required("GITHUB_TOKEN");
        let anthropic_api_key = required("ANTHROPIC_API_KEY");

        if !missing.is_empty() {
            anyhow::bail!("Missing environment variables: {}", missing.join(", "));
        }

        Ok(Self {
            slack_bot_token,
            github_token,
            anthropic_api_key,
            slack_signing_secret: get("SLACK_SIGNING_SECRET"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.github.default_branch, "main");
        assert_eq!(config.github.source_extension, "swift");
        assert_eq!(config.model.name, DEFAULT_MODEL);
        assert_eq!(config.model.fix_max_tokens, 16384);
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.tree_cache_ttl(), Duration::from_secs(300));
        assert!(config.alerts.console_url.is_empty());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[github]
owner = " acme "
repo = "app"
source_extension = ".kt"
pr_labels = ["bug", " bug ", ""]

[slack]
channel_id = "C123"

[model]
analysis_max_tokens = 0
request_timeout_secs = 30
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.github.owner, "acme");
        assert_eq!(config.github.source_extension, "kt");
        assert_eq!(config.github.pr_labels, vec!["bug"]);
        assert_eq!(config.model.analysis_max_tokens, 2048);
        assert_eq!(config.model.request_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(Config::from_toml("[github\nowner=").is_err());
    }

    #[test]
    fn test_validate_lists_all_missing_fields() {
        let err = Config::default().validate().unwrap_err().to_string();
        assert!(err.contains("github.owner"));
        assert!(err.contains("github.repo"));
        assert!(err.contains("slack.channel_id"));
    }

    #[test]
    fn test_absurd_timeouts_fall_back() {
        let config = Config::from_toml("[server]\ninvocation_timeout_secs = 0\n[github]\ntree_cache_ttl_secs = 999999").unwrap();
        assert_eq!(config.invocation_timeout(), Duration::from_secs(300));
        assert_eq!(config.github.tree_cache_ttl_secs, 300);
    }

    #[test]
    fn test_secrets_treat_empty_as_missing() {
        let env: HashMap<&str, &str> = [
            ("SLACK_BOT_TOKEN", "xoxb-1"),
            ("GITHUB_TOKEN", "  "),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]
        .into_iter()
        .collect();
        let err = Secrets::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err.to_string(), "Missing environment variables: GITHUB_TOKEN");
    }

    #[test]
    fn test_secrets_optional_signing_secret() {
        let env: HashMap<&str, &str> = [
            ("SLACK_BOT_TOKEN", "xoxb-1"),
            ("GITHUB_TOKEN", "ghp"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]
        .into_iter()
        .collect();
        let secrets = Secrets::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert!(secrets.slack_signing_secret.is_none());
        assert!(!format!("{:?}", secrets).contains("xoxb"));
    }
}
