//! Reasoning model integration
//!
//! [`ReasoningModel`] is the single-turn completion seam; [`AnthropicClient`]
//! implements it over HTTP. [`DiagnosticEngine`] builds the analysis and
//! fix-generation requests on top of it.

mod client;
mod diagnose;
mod models;
mod parse;
mod prompts;

pub use client::AnthropicClient;
pub use diagnose::DiagnosticEngine;
pub use models::{Completion, Usage, DEFAULT_MODEL};
pub use parse::{
    parse_fix_proposal, repair_truncated_json, strip_code_fences, FixProposal, ProposedFix,
};
pub use prompts::{analysis_prompt, fix_prompt, pattern_hints, CRASH_PATTERNS};

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ReasoningModel: Send + Sync {
    /// Send one user prompt and return the model's reply.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<Completion>;
}
