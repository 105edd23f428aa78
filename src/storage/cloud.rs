// vault-raft-snapshot-agent/src/storage/cloud.rs
//! GCS and Azure Blob destinations, both driven through `object_store`.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectMeta, ObjectStore, PutPayload};
use std::sync::Arc;
use std::time::Duration;

use super::retention::{key_timestamp, object_key, plan_pruning, snapshot_file_name};
use super::{BackendKind, Snapshot, SnapshotStore};
use crate::config::{AzureConfig, GcsConfig};
use crate::errors::StorageError;

#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    kind: BackendKind,
    store: Arc<dyn ObjectStore>,
    /// `gs://bucket` or `az://account/container`, used in messages only.
    root: String,
    /// Prefix as configured. Keys are built from it and then encoded by
    /// `ObjectPath::from`.
    raw_prefix: String,
    /// The same prefix in the encoded form that listings return.
    key_prefix: String,
    /// Deepest whole directory of the prefix, the scope for listings.
    list_dir: Option<ObjectPath>,
    static_snapshot_name: Option<String>,
}

impl ObjectStoreBackend {
    pub fn new(
        kind: BackendKind,
        store: Arc<dyn ObjectStore>,
        root: String,
        key_prefix: String,
        static_snapshot_name: Option<String>,
    ) -> Self {
        let (key_prefix_encoded, list_dir) = encoded_prefix(&key_prefix);
        ObjectStoreBackend {
            kind,
            store,
            root,
            raw_prefix: key_prefix,
            key_prefix: key_prefix_encoded,
            list_dir,
            static_snapshot_name,
        }
    }

    /// Without a service account path, credentials come from the
    /// environment (`GOOGLE_APPLICATION_CREDENTIALS`, workload identity).
    pub fn gcs(config: &GcsConfig, timeout: Duration) -> Result<Self, StorageError> {
        let mut builder = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&config.bucket)
            .with_client_options(ClientOptions::new().with_timeout(timeout));
        if let Some(path) = &config.service_account_path {
            builder = builder.with_service_account_path(path);
        }

        Ok(Self::new(
            BackendKind::Gcp,
            Arc::new(builder.build()?),
            format!("gs://{}", config.bucket),
            config.key_prefix.clone(),
            config.static_snapshot_name.clone(),
        ))
    }

    pub fn azure(config: &AzureConfig, timeout: Duration) -> Result<Self, StorageError> {
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&config.account_name)
            .with_container_name(&config.container_name)
            .with_client_options(ClientOptions::new().with_timeout(timeout));
        if let Some(key) = &config.account_key {
            builder = builder.with_access_key(key);
        }

        Ok(Self::new(
            BackendKind::Azure,
            Arc::new(builder.build()?),
            format!("az://{}/{}", config.account_name, config.container_name),
            config.key_prefix.clone(),
            config.static_snapshot_name.clone(),
        ))
    }

    /// `object_store` lists by whole path segments, so list the directory
    /// part of the prefix and filter the rest by string.
    async fn list_snapshot_objects(&self) -> Result<Vec<(i64, ObjectPath)>, StorageError> {
        let objects: Vec<ObjectMeta> = self.store.list(self.list_dir.as_ref()).try_collect().await?;
        Ok(objects
            .into_iter()
            .filter_map(|meta| {
                key_timestamp(&self.key_prefix, meta.location.as_ref())
                    .map(|timestamp| (timestamp, meta.location))
            })
            .collect())
    }
}

/// Runs a snapshot name through the same encoding `write` applies, so the
/// prefix compares equal to listed locations. `ObjectPath::from` drops empty
/// segments (`raft//`, a leading `/`) and percent-encodes characters such as
/// `{` or `%`.
fn encoded_prefix(raw_prefix: &str) -> (String, Option<ObjectPath>) {
    let name = snapshot_file_name(0);
    let sample = ObjectPath::from(format!("{raw_prefix}{name}"));

    let prefix = sample
        .as_ref()
        .strip_suffix(name.as_str())
        .unwrap_or_default()
        .to_string();

    let mut parts: Vec<_> = sample.parts().collect();
    parts.pop();
    let dir = (!parts.is_empty()).then(|| parts.into_iter().collect::<ObjectPath>());

    (prefix, dir)
}

#[async_trait]
impl SnapshotStore for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn location(&self) -> String {
        format!("{}/{}", self.root, self.key_prefix)
    }

    fn retention_enabled(&self) -> bool {
        self.static_snapshot_name.is_none()
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<String, StorageError> {
        let key = object_key(
            &self.raw_prefix,
            self.static_snapshot_name.as_deref(),
            snapshot.timestamp,
        );
        let path = ObjectPath::from(key);

        self.store
            .put(&path, PutPayload::from(snapshot.data.clone()))
            .await?;

        tracing::debug!(backend = %self.kind, %path, bytes = snapshot.data.len(), "uploaded snapshot");
        Ok(format!("{}/{}", self.root, path))
    }

    async fn prune(&self, retain: u64) -> Result<usize, StorageError> {
        if retain == 0 || !self.retention_enabled() {
            return Ok(0);
        }

        let doomed = plan_pruning(self.list_snapshot_objects().await?, retain);
        for path in &doomed {
            tracing::debug!(backend = %self.kind, %path, "deleting old snapshot");
            self.store.delete(path).await?;
        }
        Ok(doomed.len())
    }
}
