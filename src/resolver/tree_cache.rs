//! Time-bounded cache of the default branch's blob listing.
//!
//! Readers and refreshers race freely: a lookup inside the TTL serves the
//! stored listing, a lookup after it refetches, and concurrent refreshes
//! simply overwrite each other. The lock is only held to copy an `Arc` in
//! or out, never across an await.

use crate::github::SourceHost;
use anyhow::Result;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct TreeSnapshot {
    paths: Arc<Vec<String>>,
    fetched_at: Instant,
}

pub struct TreeCache {
    ttl: Duration,
    slot: RwLock<Option<TreeSnapshot>>,
}

impl TreeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// The cached listing, if one was stored within the TTL.
    pub fn fresh(&self) -> Option<Arc<Vec<String>>> {
        let guard = self.slot.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|snap| snap.fetched_at.elapsed() < self.ttl)
            .map(|snap| Arc::clone(&snap.paths))
    }

    pub fn store(&self, paths: Vec<String>) -> Arc<Vec<String>> {
        let paths = Arc::new(paths);
        let mut guard = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(TreeSnapshot {
            paths: Arc::clone(&paths),
            fetched_at: Instant::now(),
        });
        paths
    }

    /// Serve the cached listing or fetch a new one from `host`.
    pub async fn get_or_fetch(
        &self,
        host: &dyn SourceHost,
        branch: &str,
    ) -> Result<Arc<Vec<String>>> {
        if let Some(paths) = self.fresh() {
            debug!(entries = paths.len(), "Tree cache hit");
            return Ok(paths);
        }

        let paths = host.list_blob_paths(branch).await?;
        debug!(entries = paths.len(), branch, "Tree cache refreshed");
        Ok(self.store(paths))
    }
}
