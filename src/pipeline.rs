//! Crash pipeline orchestrator
//!
//! One alert runs these stages in sequence: root alert, parse, resolve,
//! analyze (one retry), then the threaded report. Only a failed root post
//! aborts the run. A later failure is reported in the thread.

use crate::crash::CrashAlert;
use crate::github::SourceHost;
use crate::llm::DiagnosticEngine;
use crate::parser::{FileLocation, SignalParser};
use crate::resolver::SourceResolver;
use crate::slack::{Notifier, SourceLink};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// What one pipeline run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub thread_ts: String,
    pub locations: Vec<FileLocation>,
    pub resolved: usize,
    pub analysis_available: bool,
    pub fix_offered: bool,
}

pub struct CrashPipeline {
    parser: SignalParser,
    host: Arc<dyn SourceHost>,
    resolver: Arc<SourceResolver>,
    engine: Arc<DiagnosticEngine>,
    notifier: Arc<Notifier>,
}

impl CrashPipeline {
    pub fn new(
        parser: SignalParser,
        host: Arc<dyn SourceHost>,
        resolver: Arc<SourceResolver>,
        engine: Arc<DiagnosticEngine>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            parser,
            host,
            resolver,
            engine,
            notifier,
        }
    }

    pub async fn handle_alert(&self, alert: &CrashAlert) -> Result<PipelineOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("crash_pipeline", %run_id, issue_id = %alert.issue.id);
        self.run(alert).instrument(span).await
    }

    async fn run(&self, alert: &CrashAlert) -> Result<PipelineOutcome> {
        info!(kind = ?alert.kind, title = %alert.issue.title, "Crash alert received");

        let thread_ts = self
            .notifier
            .post_initial_alert(alert)
            .await
            .context("Failed to post initial alert")?;

        match self.analyze_and_report(alert, &thread_ts).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Crash pipeline failed");
                self.notifier
                    .post_failure(&thread_ts, &format!("{:#}", e))
                    .await;
                Err(e)
            }
        }
    }

    async fn analyze_and_report(
        &self,
        alert: &CrashAlert,
        thread_ts: &str,
    ) -> Result<PipelineOutcome> {
        let issue = &alert.issue;

        let locations = self.parser.parse(&issue.signal_text());
        info!(count = locations.len(), ?locations, "Extracted source hints");

        let excerpts = if locations.is_empty() {
            Vec::new()
        } else {
            self.resolver.resolve_all(&locations).await
        };
        let resolved = excerpts.iter().filter(|e| e.is_resolved()).count();
        info!(requested = excerpts.len(), resolved, "Source resolution finished");

        let analysis = self
            .engine
            .analyze_with_retry(issue, alert.label(), &excerpts)
            .await;

        let links = SourceLink::for_excerpts(self.host.as_ref(), self.resolver.branch(), &excerpts);
        let fix_offered = self
            .notifier
            .post_analysis(thread_ts, issue, analysis.as_deref(), &excerpts, &links)
            .await
            .context("Failed to post analysis")?;

        info!(fix_offered, "Crash analysis posted");

        Ok(PipelineOutcome {
            thread_ts: thread_ts.to_string(),
            locations,
            resolved,
            analysis_available: analysis.is_some(),
            fix_offered,
        })
    }
}
