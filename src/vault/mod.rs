//! Narrow view of the Vault API the agent depends on.

pub(crate) mod client;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Deserialize;

use crate::errors::VaultError;

pub use client::VaultClient;

pub type SnapshotStream = BoxStream<'static, Result<Bytes, VaultError>>;

/// Response of `sys/leader`. Only `is_self` drives behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderStatus {
    #[serde(default)]
    pub ha_enabled: bool,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub leader_address: String,
}

/// Token issued by a login call.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthToken {
    pub client_token: String,
    /// Seconds until the token expires.
    #[serde(default)]
    pub lease_duration: u64,
}

#[async_trait]
pub trait VaultApi: Send + Sync {
    async fn leader_status(&self) -> Result<LeaderStatus, VaultError>;

    /// Opens the raft snapshot stream. The body is not buffered here.
    async fn stream_snapshot(&self, token: &str) -> Result<SnapshotStream, VaultError>;

    async fn login_approle(
        &self,
        mount_path: &str,
        role_id: &str,
        secret_id: &str,
    ) -> Result<AuthToken, VaultError>;

    async fn login_kubernetes(
        &self,
        mount_path: &str,
        role: &str,
        jwt: &str,
    ) -> Result<AuthToken, VaultError>;
}
