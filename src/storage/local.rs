// vault-raft-snapshot-agent/src/storage/local.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::retention::{parse_snapshot_timestamp, plan_pruning, snapshot_file_name};
use super::{BackendKind, Snapshot, SnapshotStore};
use crate::errors::StorageError;

/// Snapshots as files in a single directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    dir: PathBuf,
}

impl LocalBackend {
    pub fn new(dir: &Path) -> Self {
        LocalBackend {
            dir: dir.to_path_buf(),
        }
    }

    /// Snapshot files directly inside the directory, with their timestamps.
    fn list_snapshots(dir: &Path) -> Result<Vec<(i64, PathBuf)>, StorageError> {
        let mut found = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(timestamp) = entry.file_name().to_str().and_then(parse_snapshot_timestamp) else {
                continue;
            };
            found.push((timestamp, entry.into_path()));
        }
        Ok(found)
    }
}

/// Rename over any existing file so a collision never leaves a torn snapshot.
async fn write_then_rename(temp_path: &Path, final_path: &Path, data: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(temp_path, data).await?;
    tokio::fs::rename(temp_path, final_path).await
}

#[async_trait]
impl SnapshotStore for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }

    fn retention_enabled(&self) -> bool {
        true
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<String, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = snapshot_file_name(snapshot.timestamp);
        let final_path = self.dir.join(&file_name);
        let temp_path = self.dir.join(format!(".{file_name}.tmp"));

        if let Err(e) = write_then_rename(&temp_path, &final_path, &snapshot.data).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                tracing::debug!(path = %temp_path.display(), error = %cleanup, "temporary snapshot not removed");
            }
            return Err(e.into());
        }

        tracing::debug!(path = %final_path.display(), bytes = snapshot.data.len(), "wrote local snapshot");
        Ok(final_path.display().to_string())
    }

    async fn prune(&self, retain: u64) -> Result<usize, StorageError> {
        if retain == 0 {
            return Ok(0);
        }

        let dir = self.dir.clone();
        let snapshots = tokio::task::spawn_blocking(move || Self::list_snapshots(&dir))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        let doomed = plan_pruning(snapshots, retain);
        for path in &doomed {
            tracing::debug!(path = %path.display(), "removing old local snapshot");
            tokio::fs::remove_file(path).await?;
        }
        Ok(doomed.len())
    }
}
