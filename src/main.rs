//! Vault Raft Snapshot Agent
//!
//! Periodically captures a raft snapshot from the active Vault leader and
//! stores it in a local directory, S3, GCS or Azure Blob Storage.

// vault-raft-snapshot-agent/src/main.rs
mod agent;
mod config;
mod errors;
mod storage;
mod vault;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AgentConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "vault-raft-snapshot-agent", version, about)]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single snapshot cycle even if daemon mode is configured
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logger();
    let args = Args::parse();

    match run_app(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .init();
}

async fn run_app(args: Args) -> Result<ExitCode> {
    tracing::info!(path = %args.config.display(), "Reading configuration...");
    let config = AgentConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let client = vault::VaultClient::new(&config.address, config.request_timeout, config.insecure_tls)
        .context("Cannot instantiate Vault client")?;
    let backend = storage::open_backend(&config.storage, config.request_timeout)
        .await
        .context("Cannot open snapshot storage backend")?;
    let mut snapshotter = agent::Snapshotter::new(client);

    if config.daemon && !args.once {
        let shutdown = agent::listen_for_shutdown_signals();
        agent::run_daemon(&mut snapshotter, &config, backend.as_ref(), shutdown).await;
        // Daemon mode only ends on a termination signal.
        return Ok(ExitCode::FAILURE);
    }

    match agent::run_once(&mut snapshotter, &config, backend.as_ref()).await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
