use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kubemcp_k8s::{ContextRegistry, KubeClient};
use kubemcp_mcp::KubeHandler;

mod config;

use config::FileConfig;

/// kubemcp - An MCP server for Kubernetes clusters across many kubeconfig contexts
#[derive(Parser, Debug)]
#[command(name = "kubemcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of kubeconfig files (a file path means its directory)
    #[arg(long, env = "KUBECONFIG_DIR", value_name = "DIR")]
    kubeconfig_dir: Option<PathBuf>,

    /// Optional TOML configuration file
    #[arg(long, env = "KUBEMCP_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `kubemcp_k8s=trace` (overrides RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol, so logs go to stderr
    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = file.settings()?;
    let dir = config::kubeconfig_dir(args.kubeconfig_dir, &file)?;

    let registry = ContextRegistry::load(&dir)
        .with_context(|| format!("failed to load kubeconfigs from {}", dir.display()))?;
    info!(
        "kubemcp {} ready with contexts: {}",
        env!("CARGO_PKG_VERSION"),
        registry.names().join(", ")
    );

    let client = Arc::new(KubeClient::new(registry, settings));
    let handler = KubeHandler::new(client);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            signal.cancel();
        }
    });

    info!("Serving MCP over stdio");
    let service = handler
        .serve_with_ct(stdio(), shutdown)
        .await
        .inspect_err(|e| error!("MCP serve error: {:?}", e))?;
    let reason = service.waiting().await?;
    info!("kubemcp stopped: {:?}", reason);
    Ok(())
}
