//! crash-triage library crate
//!
//! Exposes the pipeline stages so the binary, benchmarks and tests can
//! exercise them without going through server startup.

pub mod config;
pub mod crash;
pub mod github;
pub mod llm;
pub mod parser;
pub mod pipeline;
pub mod remediation;
pub mod resolver;
pub mod scenarios;
pub mod server;
pub mod slack;
pub mod util;

#[cfg(test)]
mod testing;
