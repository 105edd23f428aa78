// vault-raft-snapshot-agent/src/agent/runner.rs
use std::fmt;

use super::Snapshotter;
use super::capture::capture_snapshot;
use super::leader::is_leader;
use crate::config::AgentConfig;
use crate::errors::{CycleError, Result, RetentionError, StorageError};
use crate::storage::{BackendKind, SnapshotStore};
use crate::vault::VaultApi;

/// How a cycle ended when it did not fail.
#[derive(Debug)]
pub enum CycleOutcome {
    Created {
        backend: BackendKind,
        destination: String,
        pruned: usize,
        /// Pruning failed after the write; the snapshot still counts.
        retention_error: Option<RetentionError>,
    },
    SkippedNotLeader,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Created {
                backend,
                destination,
                pruned,
                retention_error,
            } => {
                write!(f, "successfully created {backend} snapshot to {destination}")?;
                if *pruned > 0 {
                    write!(f, ", removed {pruned} old snapshot(s)")?;
                }
                if let Some(e) = retention_error {
                    write!(f, " ({e})")?;
                }
                Ok(())
            }
            CycleOutcome::SkippedNotLeader => f.write_str("not running on leader node, snapshot skipped"),
        }
    }
}

/// One backup attempt: refresh the token if needed, check leadership,
/// capture, write, prune. Nothing is retried within the cycle.
pub async fn run_backup<A: VaultApi>(
    snapshotter: &mut Snapshotter<A>,
    config: &AgentConfig,
    backend: &dyn SnapshotStore,
) -> Result<CycleOutcome> {
    snapshotter.ensure_token(&config.auth).await?;

    if !is_leader(snapshotter.api()).await? {
        return Ok(CycleOutcome::SkippedNotLeader);
    }

    let snapshot = capture_snapshot(
        snapshotter.api(),
        &snapshotter.session().token,
        config.request_timeout,
    )
    .await?;

    let destination = tokio::time::timeout(config.request_timeout, backend.write(&snapshot))
        .await
        .unwrap_or(Err(StorageError::Timeout(config.request_timeout)))
        .map_err(|source| CycleError::BackendWrite {
            backend: backend.kind(),
            destination: backend.location(),
            source,
        })?;
    drop(snapshot);

    let (pruned, retention_error) = if config.retain > 0 && backend.retention_enabled() {
        match tokio::time::timeout(config.request_timeout, backend.prune(config.retain))
            .await
            .unwrap_or(Err(StorageError::Timeout(config.request_timeout)))
        {
            Ok(pruned) => (pruned, None),
            Err(source) => (
                0,
                Some(RetentionError {
                    backend: backend.kind(),
                    location: backend.location(),
                    source,
                }),
            ),
        }
    } else {
        (0, None)
    };

    Ok(CycleOutcome::Created {
        backend: backend.kind(),
        destination,
        pruned,
        retention_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AuthSession;
    use crate::agent::testing::{Call, FakeVault, RecordingStore, agent_config};
    use crate::storage::LocalBackend;
    use chrono::{TimeDelta, Utc};

    fn fresh_session() -> AuthSession {
        AuthSession {
            token: "held-token".to_string(),
            expires_at: Utc::now() + TimeDelta::hours(1),
        }
    }

    #[tokio::test]
    async fn test_expired_token_logs_in_before_leader_query() -> anyhow::Result<()> {
        let mut snapshotter = Snapshotter::new(FakeVault::leader());
        let store = RecordingStore::new();

        let outcome = run_backup(&mut snapshotter, &agent_config(3), &store).await?;

        assert!(matches!(outcome, CycleOutcome::Created { .. }));
        assert_eq!(
            snapshotter.api().calls(),
            vec![
                Call::LoginAppRole {
                    mount: "approle".to_string(),
                    role_id: "role-id".to_string(),
                    secret_id: "secret-id".to_string(),
                },
                Call::Leader,
                Call::Snapshot {
                    token: "token-1".to_string()
                },
            ]
        );
        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.prunes(), vec![3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_token_means_no_login() -> anyhow::Result<()> {
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());
        let store = RecordingStore::new();

        run_backup(&mut snapshotter, &agent_config(3), &store).await?;

        assert_eq!(
            snapshotter.api().calls(),
            vec![
                Call::Leader,
                Call::Snapshot {
                    token: "held-token".to_string()
                }
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_follower_skips_without_capture_or_write() -> anyhow::Result<()> {
        let mut snapshotter = Snapshotter::with_session(FakeVault::follower(), fresh_session());
        let store = RecordingStore::new();

        let outcome = run_backup(&mut snapshotter, &agent_config(3), &store).await?;

        assert!(matches!(outcome, CycleOutcome::SkippedNotLeader));
        assert!(outcome.to_string().contains("not running on leader node"));
        assert_eq!(snapshotter.api().calls(), vec![Call::Leader]);
        assert!(store.writes().is_empty());
        assert!(store.prunes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_before_leader_query() {
        let mut snapshotter = Snapshotter::new(FakeVault::leader().failing_login());
        let store = RecordingStore::new();

        let err = run_backup(&mut snapshotter, &agent_config(3), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Auth { .. }));
        assert_eq!(snapshotter.api().calls().len(), 1);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_leader_query_failure() {
        let mut snapshotter =
            Snapshotter::with_session(FakeVault::leader().failing_leader_query(), fresh_session());
        let store = RecordingStore::new();

        let err = run_backup(&mut snapshotter, &agent_config(3), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::LeaderQuery(_)));
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_capture_error_means_no_write() {
        let vault = FakeVault::leader().with_chunks(vec![Ok(&b"half"[..]), Err(())]);
        let mut snapshotter = Snapshotter::with_session(vault, fresh_session());
        let store = RecordingStore::new();

        let err = run_backup(&mut snapshotter, &agent_config(3), &store)
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::Capture(_)));
        assert!(store.writes().is_empty());
        assert!(store.prunes().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_names_backend_and_skips_prune() {
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());
        let store = RecordingStore::new().failing_write();

        let err = run_backup(&mut snapshotter, &agent_config(3), &store)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CycleError::BackendWrite {
                backend: BackendKind::Local,
                ..
            }
        ));
        assert!(err.to_string().starts_with("failed to generate local snapshot to /snapshots"));
        assert!(store.prunes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_times_out() {
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());
        let store = RecordingStore::new().stalling_write();

        let err = run_backup(&mut snapshotter, &agent_config(3), &store)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CycleError::BackendWrite {
                source: StorageError::Timeout(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_retention_failure_does_not_fail_cycle() -> anyhow::Result<()> {
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());
        let store = RecordingStore::new().failing_prune();

        let outcome = run_backup(&mut snapshotter, &agent_config(3), &store).await?;

        match &outcome {
            CycleOutcome::Created {
                retention_error, ..
            } => assert!(retention_error.is_some()),
            other => panic!("expected created outcome, got {other:?}"),
        }
        assert_eq!(store.writes().len(), 1);
        assert!(outcome.to_string().contains("failed to prune local snapshots"));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_retain_never_prunes() -> anyhow::Result<()> {
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());
        let store = RecordingStore::new();

        run_backup(&mut snapshotter, &agent_config(0), &store).await?;

        assert_eq!(store.writes().len(), 1);
        assert!(store.prunes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_static_name_never_prunes() -> anyhow::Result<()> {
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());
        let store = RecordingStore::new().static_name();

        for _ in 0..10 {
            run_backup(&mut snapshotter, &agent_config(3), &store).await?;
        }

        assert_eq!(store.writes().len(), 10);
        assert!(store.prunes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_local_retention_scenario() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        for ts in [1_i64, 2, 3, 4] {
            std::fs::write(
                tmp.path().join(format!("vault-raft-snap-{ts}.snap")),
                b"old",
            )?;
        }
        let backend = LocalBackend::new(tmp.path());
        let mut snapshotter = Snapshotter::with_session(FakeVault::leader(), fresh_session());

        let outcome = run_backup(&mut snapshotter, &agent_config(3), &backend).await?;

        let CycleOutcome::Created {
            destination, pruned, ..
        } = outcome
        else {
            panic!("expected a created snapshot");
        };
        assert_eq!(pruned, 2);

        let mut timestamps: Vec<i64> = std::fs::read_dir(tmp.path())?
            .map(|e| {
                let name = e?.file_name().to_string_lossy().into_owned();
                crate::storage::retention::parse_snapshot_timestamp(&name)
                    .ok_or_else(|| anyhow::anyhow!("unexpected file {name}"))
            })
            .collect::<anyhow::Result<_>>()?;
        timestamps.sort();
        assert_eq!(timestamps.len(), 3);
        assert_eq!(&timestamps[..2], &[3, 4]);
        assert!(destination.ends_with(&format!("vault-raft-snap-{}.snap", timestamps[2])));
        assert_eq!(std::fs::read(&destination)?, b"raft-snapshot");
        Ok(())
    }
}
