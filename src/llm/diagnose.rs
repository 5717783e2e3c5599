use super::parse::{parse_fix_proposal, FixProposal};
use super::prompts::{analysis_prompt, fix_prompt};
use super::ReasoningModel;
use crate::crash::CrashIssue;
use crate::resolver::{ResolvedFile, SourceExcerpt};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs the two model calls of the pipeline: a free-text diagnosis and a
/// structured fix proposal.
pub struct DiagnosticEngine {
    model: Arc<dyn ReasoningModel>,
    analysis_max_tokens: u32,
    fix_max_tokens: u32,
    retry_delay: Duration,
}

impl DiagnosticEngine {
    pub fn new(
        model: Arc<dyn ReasoningModel>,
        analysis_max_tokens: u32,
        fix_max_tokens: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            model,
            analysis_max_tokens,
            fix_max_tokens,
            retry_delay,
        }
    }

    /// One analysis attempt. An empty reply counts as a failure.
    pub async fn analyze(
        &self,
        issue: &CrashIssue,
        alert_label: &str,
        excerpts: &[SourceExcerpt],
    ) -> Result<String> {
        let prompt = analysis_prompt(issue, alert_label, excerpts);
        let completion = self.model.complete(&prompt, self.analysis_max_tokens).await?;
        if completion.truncated {
            warn!("Analysis reply hit the output cap");
        }
        let text = completion.text.trim();
        if text.is_empty() {
            anyhow::bail!("Model returned an empty analysis");
        }
        Ok(text.to_string())
    }

    /// Analyze, retrying once after the configured delay. `None` means both
    /// attempts failed.
    pub async fn analyze_with_retry(
        &self,
        issue: &CrashIssue,
        alert_label: &str,
        excerpts: &[SourceExcerpt],
    ) -> Option<String> {
        match self.analyze(issue, alert_label, excerpts).await {
            Ok(text) => return Some(text),
            Err(e) => warn!(
                error = %e,
                retry_in_secs = self.retry_delay.as_secs(),
                "Analysis failed, retrying once"
            ),
        }

        tokio::time::sleep(self.retry_delay).await;

        match self.analyze(issue, alert_label, excerpts).await {
            Ok(text) => Some(text),
            Err(e) => {
                error!(error = %e, "Analysis failed after retry");
                None
            }
        }
    }

    /// Ask for whole-file fixes over the resolved excerpts.
    ///
    /// Returns `None` without calling the model when nothing resolved, and
    /// `None` when the reply cannot be decoded or only targets files that
    /// were not provided.
    pub async fn generate_fix(
        &self,
        issue: &CrashIssue,
        excerpts: &[SourceExcerpt],
    ) -> Option<FixProposal> {
        let files: Vec<(&ResolvedFile, Option<u32>)> = excerpts
            .iter()
            .filter_map(|e| e.resolved().map(|file| (file, e.line())))
            .collect();

        if files.is_empty() {
            warn!("No resolved source files, skipping fix generation");
            return None;
        }

        let prompt = fix_prompt(issue, &files);
        let completion = match self.model.complete(&prompt, self.fix_max_tokens).await {
            Ok(completion) => completion,
            Err(e) => {
                error!(error = %e, "Fix generation call failed");
                return None;
            }
        };

        if completion.truncated {
            warn!(
                chars = completion.text.len(),
                "Fix reply hit the output cap, recovery may be needed"
            );
        }

        let mut proposal = parse_fix_proposal(&completion.text)?;

        let known: HashSet<&str> = files.iter().map(|(file, _)| file.path.as_str()).collect();
        proposal.fixes.retain(|fix| {
            let path = normalize_path(&fix.file_path);
            let keep = known.contains(path);
            if !keep {
                warn!(path = %fix.file_path, "Dropping fix for a file that was not provided");
            }
            keep
        });
        for fix in &mut proposal.fixes {
            fix.file_path = normalize_path(&fix.file_path).to_string();
        }

        if proposal.fixes.is_empty() {
            return None;
        }

        info!(fixes = proposal.fixes.len(), "Fix proposal generated");
        Some(proposal)
    }
}

fn normalize_path(path: &str) -> &str {
    path.trim().trim_start_matches("./").trim_start_matches('/')
}
