// vault-raft-snapshot-agent/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use s3::types::ServerSideEncryption;
use std::time::Duration;

use super::retention::{key_timestamp, object_key, plan_pruning};
use super::{BackendKind, Snapshot, SnapshotStore};
use crate::config::S3Config;
use crate::errors::StorageError;

/// Snapshots as objects in an S3 (or S3-compatible) bucket.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: s3::Client,
    bucket: String,
    key_prefix: String,
    server_side_encryption: bool,
    static_snapshot_name: Option<String>,
}

impl S3Backend {
    /// Builds the client. Static credentials are used when both halves are
    /// configured, otherwise the default AWS provider chain applies.
    pub async fn connect(config: &S3Config, timeout: Duration) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest()).timeout_config(
            aws_config::timeout::TimeoutConfig::builder()
                .operation_timeout(timeout)
                .build(),
        );

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                key_id,
                secret,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self::with_client(s3::Client::from_conf(s3_config), config)
    }

    fn with_client(client: s3::Client, config: &S3Config) -> Self {
        S3Backend {
            client,
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
            server_side_encryption: config.server_side_encryption,
            static_snapshot_name: config.static_snapshot_name.clone(),
        }
    }

    async fn list_snapshot_keys(&self) -> Result<Vec<(i64, String)>, StorageError> {
        let mut found = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.key_prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                if let Some(timestamp) = key_timestamp(&self.key_prefix, key) {
                    found.push((timestamp, key.to_string()));
                }
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl SnapshotStore for S3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Aws
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key_prefix)
    }

    fn retention_enabled(&self) -> bool {
        self.static_snapshot_name.is_none()
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<String, StorageError> {
        let key = object_key(
            &self.key_prefix,
            self.static_snapshot_name.as_deref(),
            snapshot.timestamp,
        );

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(snapshot.data.clone()));
        if self.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }
        request.send().await?;

        tracing::debug!(bucket = %self.bucket, %key, bytes = snapshot.data.len(), "uploaded snapshot to s3");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn prune(&self, retain: u64) -> Result<usize, StorageError> {
        if retain == 0 || !self.retention_enabled() {
            return Ok(0);
        }

        let doomed = plan_pruning(self.list_snapshot_keys().await?, retain);
        for key in &doomed {
            tracing::debug!(bucket = %self.bucket, %key, "deleting old s3 snapshot");
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await?;
        }
        Ok(doomed.len())
    }
}
