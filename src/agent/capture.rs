// vault-raft-snapshot-agent/src/agent/capture.rs
use bytes::BytesMut;
use chrono::Utc;
use futures_util::TryStreamExt;
use std::time::Duration;

use crate::errors::{CycleError, VaultError};
use crate::storage::Snapshot;
use crate::vault::VaultApi;

/// Streams the raft snapshot fully into memory. Nothing is returned unless
/// the whole stream was read within `timeout`.
pub async fn capture_snapshot<A: VaultApi>(
    api: &A,
    token: &str,
    timeout: Duration,
) -> Result<Snapshot, CycleError> {
    let timestamp = Utc::now()
        .timestamp_nanos_opt()
        .ok_or_else(|| CycleError::Capture("system clock is outside the representable range".to_string()))?;

    let data = tokio::time::timeout(timeout, read_stream(api, token))
        .await
        .map_err(|_| CycleError::Capture(format!("snapshot stream timed out after {timeout:?}")))?
        .map_err(|e| CycleError::Capture(e.to_string()))?;

    if data.is_empty() {
        return Err(CycleError::Capture("Vault returned an empty snapshot".to_string()));
    }

    tracing::debug!(bytes = data.len(), timestamp, "snapshot captured");
    Ok(Snapshot {
        data: data.freeze(),
        timestamp,
    })
}

async fn read_stream<A: VaultApi>(api: &A, token: &str) -> Result<BytesMut, VaultError> {
    let stream = api.stream_snapshot(token).await?;
    stream
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await
}
