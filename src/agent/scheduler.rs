// vault-raft-snapshot-agent/src/agent/scheduler.rs
use tokio::sync::oneshot;

use super::Snapshotter;
use super::runner::{CycleOutcome, run_backup};
use crate::config::AgentConfig;
use crate::errors::Result;
use crate::storage::SnapshotStore;
use crate::vault::VaultApi;

/// Runs a single cycle and logs its outcome.
pub async fn run_once<A: VaultApi>(
    snapshotter: &mut Snapshotter<A>,
    config: &AgentConfig,
    backend: &dyn SnapshotStore,
) -> Result<CycleOutcome> {
    let result = run_backup(snapshotter, config, backend).await;
    report(&result);
    result
}

/// Runs a cycle, then waits for either the next tick or `shutdown`. Cycles
/// never overlap and a shutdown is only observed between cycles.
pub async fn run_daemon<A: VaultApi>(
    snapshotter: &mut Snapshotter<A>,
    config: &AgentConfig,
    backend: &dyn SnapshotStore,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::info!(frequency = %humantime::format_duration(config.frequency), "starting snapshot daemon");
    loop {
        let result = run_backup(snapshotter, config, backend).await;
        report(&result);

        tokio::select! {
            _ = tokio::time::sleep(config.frequency) => {}
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, stopping snapshot daemon");
                return;
            }
        }
    }
}

/// Spawns a task that fires the returned receiver on SIGINT or SIGTERM.
pub fn listen_for_shutdown_signals() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(signal) => {
                tracing::info!(signal, "received termination signal");
                let _ = tx.send(());
            }
            Err(e) => {
                // Keep the sender alive so the daemon isn't stopped by a dropped channel.
                tracing::error!(error = %e, "failed to install signal handlers");
                std::future::pending::<()>().await;
                drop(tx);
            }
        }
    });
    rx
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}

/// The single terminal log line for a cycle.
fn report(result: &Result<CycleOutcome>) {
    match result {
        Ok(outcome @ CycleOutcome::Created {
            retention_error: Some(_),
            ..
        }) => tracing::warn!("{outcome}"),
        Ok(outcome) => tracing::info!("{outcome}"),
        Err(e) => tracing::error!("{e}"),
    }
}
