//! Council CLI: run one session from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use council::{
    CouncilConfig, CouncilEngine, HttpInvoker, HttpInvokerConfig, MemberId, TracingAuditSink,
};

#[derive(Debug, Parser)]
#[command(
    name = "council",
    about = "Query a council of models and synthesize one answer"
)]
struct Cli {
    /// The question to put before the council.
    query: String,

    /// Path to a YAML or TOML council configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated member model ids (overrides the config file).
    #[arg(long, value_delimiter = ',')]
    members: Vec<String>,

    /// Chairman model id (overrides the config file).
    #[arg(long)]
    chairman: Option<String>,

    /// Global session timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// OpenAI-compatible endpoint base URL (default: COUNCIL_BASE_URL).
    #[arg(long)]
    base_url: Option<String>,

    /// Pretty-print the verdict JSON.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CouncilConfig::from_path(path)?,
        None => CouncilConfig::default(),
    };
    if !cli.members.is_empty() {
        config.members = cli.members.iter().map(MemberId::new).collect();
    }
    if let Some(chairman) = &cli.chairman {
        config.chairman = MemberId::new(chairman);
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    let mut invoker_config = HttpInvokerConfig::default();
    if let Some(base_url) = cli.base_url {
        invoker_config.base_url = base_url;
    }
    let invoker = HttpInvoker::new(invoker_config).context("building HTTP invoker")?;

    info!(
        members = config.members.len(),
        chairman = %config.chairman,
        "convening council"
    );

    let engine =
        CouncilEngine::new(config, Arc::new(invoker))?.with_audit_sink(Arc::new(TracingAuditSink));
    let verdict = engine.run(&cli.query).await?;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&verdict)?
    } else {
        serde_json::to_string(&verdict)?
    };
    println!("{rendered}");

    Ok(())
}
