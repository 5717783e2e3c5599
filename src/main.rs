use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crash_triage::config::{Config, Secrets};
use crash_triage::github::{GitHubClient, SourceHost};
use crash_triage::llm::{AnthropicClient, DiagnosticEngine};
use crash_triage::parser::SignalParser;
use crash_triage::pipeline::CrashPipeline;
use crash_triage::remediation::RemediationPublisher;
use crash_triage::resolver::{SourceResolver, TreeCache};
use crash_triage::scenarios::{CustomIssue, ScenarioRunner};
use crash_triage::server::{self, AppState};
use crash_triage::slack::{ChatClient, InteractionHandler, Notifier, SlackClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "crash-triage",
    about = "Turns crash alerts into Slack reports, AI root-cause analysis and fix pull requests",
    version
)]
struct Args {
    /// Path to the config file (defaults to ~/.config/crash-triage/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server
    Serve,

    /// Run the manual crash trigger once and print the JSON result
    Trigger {
        /// Scenario id, `all` or `list`; omitted picks one at random
        #[arg(short, long)]
        scenario: Option<String>,

        /// Custom issue title (overrides a named scenario)
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        subtitle: Option<String>,

        #[arg(long)]
        app_version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    config.validate()?;
    let secrets = Secrets::from_env()?;
    let state = build_state(&config, &secrets)?;

    match args.command {
        Command::Serve => server::serve(&config.server.bind, state).await,
        Command::Trigger {
            scenario,
            title,
            subtitle,
            app_version,
        } => {
            let custom = CustomIssue {
                title,
                subtitle,
                app_version,
                scenario: None,
            };
            let response = state.scenarios.trigger(scenario.as_deref(), Some(&custom)).await;
            println!("{}", serde_json::to_string_pretty(response.body())?);
            if response.status() != 200 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn build_state(config: &Config, secrets: &Secrets) -> Result<AppState> {
    let gh = &config.github;
    let host: Arc<dyn SourceHost> = Arc::new(GitHubClient::new(
        &secrets.github_token,
        &gh.owner,
        &gh.repo,
        &gh.api_base,
    )?);
    let chat: Arc<dyn ChatClient> = Arc::new(SlackClient::new(
        &secrets.slack_bot_token,
        &config.slack.api_base,
    )?);
    let model = Arc::new(AnthropicClient::new(
        &secrets.anthropic_api_key,
        &config.model.name,
        &config.model.api_base,
        Duration::from_secs(config.model.request_timeout_secs),
    )?);

    let parser = SignalParser::new(&gh.source_extension)
        .with_context(|| format!("Invalid source extension '{}'", gh.source_extension))?;
    let resolver = Arc::new(SourceResolver::new(
        host.clone(),
        Arc::new(TreeCache::new(config.tree_cache_ttl())),
        &gh.default_branch,
    ));
    let engine = Arc::new(DiagnosticEngine::new(
        model,
        config.model.analysis_max_tokens,
        config.model.fix_max_tokens,
        Duration::from_secs(config.model.analysis_retry_delay_secs),
    ));
    let notifier = Arc::new(Notifier::new(
        chat.clone(),
        &config.slack.channel_id,
        &config.alerts.console_url,
    ));
    let publisher = Arc::new(RemediationPublisher::new(
        host.clone(),
        &gh.default_branch,
        gh.pr_labels.clone(),
    ));

    let pipeline = Arc::new(CrashPipeline::new(
        parser,
        host.clone(),
        resolver.clone(),
        engine.clone(),
        notifier,
    ));
    let interactions = Arc::new(InteractionHandler::new(
        chat,
        host,
        resolver,
        engine,
        publisher,
        gh.issue_labels.clone(),
        &config.slack.channel_id,
    ));

    info!(
        repo = %format!("{}/{}", gh.owner, gh.repo),
        branch = %gh.default_branch,
        model = %config.model.name,
        "crash-triage configured"
    );

    Ok(AppState {
        scenarios: Arc::new(ScenarioRunner::new(pipeline.clone())),
        pipeline,
        interactions,
        signing_secret: secrets.slack_signing_secret.clone(),
        invocation_timeout: config.invocation_timeout(),
    })
}
