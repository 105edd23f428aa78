//! Snapshot destinations.
//!
//! Each backend stores one snapshot blob per cycle and can prune older ones.
//! Exactly one backend is opened per process, chosen from the configuration
//! by [`crate::config::select_storage_target`].

pub(crate) mod cloud;
pub(crate) mod local;
pub(crate) mod retention;
pub(crate) mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

use crate::config::StorageTarget;
use crate::errors::StorageError;

pub use cloud::ObjectStoreBackend;
pub use local::LocalBackend;
pub use s3::S3Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Aws,
    Gcp,
    Azure,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Local => "local",
            BackendKind::Aws => "aws",
            BackendKind::Gcp => "gcp",
            BackendKind::Azure => "azure",
        })
    }
}

/// A fully buffered raft snapshot, owned by a single cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Bytes,
    /// Unix nanoseconds, taken when the capture started.
    pub timestamp: i64,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human readable location of the destination, e.g. `s3://bucket/prefix`.
    fn location(&self) -> String;

    /// `false` when a static snapshot name is configured: the single object
    /// is overwritten every cycle and there is nothing to prune.
    fn retention_enabled(&self) -> bool;

    /// Stores the snapshot and returns where it was written. A name collision
    /// overwrites the existing object.
    async fn write(&self, snapshot: &Snapshot) -> Result<String, StorageError>;

    /// Deletes the oldest snapshots so that at most `retain` remain.
    /// Returns the number deleted.
    async fn prune(&self, retain: u64) -> Result<usize, StorageError>;
}

/// Opens the backend for the configured target.
pub async fn open_backend(
    target: &StorageTarget,
    timeout: Duration,
) -> Result<Box<dyn SnapshotStore>, StorageError> {
    let backend: Box<dyn SnapshotStore> = match target {
        StorageTarget::Local(cfg) => Box::new(LocalBackend::new(&cfg.path)),
        StorageTarget::Aws(cfg) => Box::new(S3Backend::connect(cfg, timeout).await),
        StorageTarget::Gcp(cfg) => Box::new(ObjectStoreBackend::gcs(cfg, timeout)?),
        StorageTarget::Azure(cfg) => Box::new(ObjectStoreBackend::azure(cfg, timeout)?),
    };
    tracing::info!(backend = %backend.kind(), location = %backend.location(), "storage backend ready");
    Ok(backend)
}
