//! Source resolver
//!
//! Maps each parsed [`FileLocation`] to one repository path using three
//! tiers, stopping at the first that succeeds:
//!
//! 1. direct read, only when the hint already contains a `/`
//! 2. code search for the hint's base name, exact path preferred
//! 3. the cached blob listing, matching the hint or `*/basename`
//!
//! Errors in any tier fall through to the next one. A hint no tier can
//! place is kept as a failed excerpt so it can still be reported.

mod excerpt;
mod tree_cache;

pub use excerpt::{excerpt_window, CONTEXT_RADIUS, HEAD_LINES};
pub use tree_cache::TreeCache;

use crate::github::{CommitSummary, RemoteFile, SourceHost};
use crate::parser::FileLocation;
use crate::util::base_name;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many recent commits accompany each resolved file
pub const HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    DirectPath,
    CodeSearch,
    TreeFallback,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionTier::DirectPath => "direct",
            ResolutionTier::CodeSearch => "search",
            ResolutionTier::TreeFallback => "tree",
        };
        f.write_str(name)
    }
}

/// A hint that was matched to a real file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    pub content: String,
    /// Numbered view around the crash line
    pub excerpt: String,
    pub sha: String,
    /// Empty when the history lookup failed
    pub history: Vec<CommitSummary>,
    pub tier: ResolutionTier,
}

impl ResolvedFile {
    pub fn history_text(&self) -> String {
        if self.history.is_empty() {
            return "(no recent commits found)".to_string();
        }
        self.history
            .iter()
            .map(CommitSummary::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedFile),
    Failed { reason: String },
}

/// Outcome of resolving one [`FileLocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExcerpt {
    pub location: FileLocation,
    pub resolution: Resolution,
}

impl SourceExcerpt {
    pub fn resolved(&self) -> Option<&ResolvedFile> {
        match &self.resolution {
            Resolution::Resolved(file) => Some(file),
            Resolution::Failed { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved().is_some()
    }

    pub fn line(&self) -> Option<u32> {
        self.location.line
    }

    fn failed(location: &FileLocation, reason: impl Into<String>) -> Self {
        Self {
            location: location.clone(),
            resolution: Resolution::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// True when at least one excerpt carries real file content.
pub fn any_resolved(excerpts: &[SourceExcerpt]) -> bool {
    excerpts.iter().any(SourceExcerpt::is_resolved)
}

pub struct SourceResolver {
    host: Arc<dyn SourceHost>,
    tree_cache: Arc<TreeCache>,
    branch: String,
}

impl SourceResolver {
    pub fn new(host: Arc<dyn SourceHost>, tree_cache: Arc<TreeCache>, branch: &str) -> Self {
        Self {
            host,
            tree_cache,
            branch: branch.to_string(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Resolve every location in order. Locations with no file name are skipped.
    pub async fn resolve_all(&self, locations: &[FileLocation]) -> Vec<SourceExcerpt> {
        let mut excerpts = Vec::with_capacity(locations.len());
        for location in locations {
            if location.file.trim().is_empty() {
                warn!("Skipping source hint without a file name");
                continue;
            }
            excerpts.push(self.resolve(location).await);
        }
        excerpts
    }

    pub async fn resolve(&self, location: &FileLocation) -> SourceExcerpt {
        let hint = location.file.as_str();

        let Some((path, tier, prefetched)) = self.locate(hint).await else {
            warn!(file = hint, "Source file not found by any tier");
            return SourceExcerpt::failed(location, "file not found in repository");
        };

        let file = match prefetched {
            Some(file) => file,
            None => match self.host.get_file(&path, &self.branch).await {
                Ok(Some(file)) => file,
                Ok(None) => {
                    warn!(path = %path, "Located file disappeared before it could be read");
                    return SourceExcerpt::failed(location, format!("{} could not be read", path));
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to read source file");
                    return SourceExcerpt::failed(location, format!("failed to read {}: {}", path, e));
                }
            },
        };

        let history = match self.host.recent_commits(&path, HISTORY_LIMIT).await {
            Ok(history) => history,
            Err(e) => {
                debug!(path = %path, error = %e, "Commit history unavailable");
                Vec::new()
            }
        };

        info!(file = hint, path = %path, tier = %tier, "Resolved source file");

        SourceExcerpt {
            location: location.clone(),
            resolution: Resolution::Resolved(ResolvedFile {
                excerpt: excerpt_window(&file.content, location.line),
                path,
                content: file.content,
                sha: file.sha,
                history,
                tier,
            }),
        }
    }

    /// Find the repository path for a hint. The direct tier hands back the
    /// file it already read so it is not fetched twice.
    async fn locate(&self, hint: &str) -> Option<(String, ResolutionTier, Option<RemoteFile>)> {
        if hint.contains('/') {
            match self.host.get_file(hint, &self.branch).await {
                Ok(Some(file)) => {
                    return Some((file.path.clone(), ResolutionTier::DirectPath, Some(file)))
                }
                Ok(None) => debug!(file = hint, "Direct path not found"),
                Err(e) => debug!(file = hint, error = %e, "Direct path lookup failed"),
            }
        }

        let name = base_name(hint);

        match self.host.search_file(name).await {
            Ok(results) => {
                let chosen = results
                    .iter()
                    .find(|path| path.as_str() == hint)
                    .or_else(|| results.first());
                if let Some(path) = chosen {
                    return Some((path.clone(), ResolutionTier::CodeSearch, None));
                }
            }
            Err(e) => warn!(file = hint, error = %e, "Code search failed"),
        }

        match self
            .tree_cache
            .get_or_fetch(self.host.as_ref(), &self.branch)
            .await
        {
            Ok(paths) => {
                let suffix = format!("/{}", name);
                if let Some(path) = paths
                    .iter()
                    .find(|path| path.as_str() == hint || path.ends_with(&suffix))
                {
                    return Some((path.clone(), ResolutionTier::TreeFallback, None));
                }
            }
            Err(e) => warn!(file = hint, error = %e, "Repository tree listing failed"),
        }

        None
    }
}
