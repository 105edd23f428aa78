//! Recording fakes for the Vault API and storage backends.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::{AgentConfig, AuthConfig, AuthMethod, LocalConfig, StorageTarget};
use crate::errors::{StorageError, VaultError};
use crate::storage::{BackendKind, Snapshot, SnapshotStore};
use crate::vault::{AuthToken, LeaderStatus, SnapshotStream, VaultApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Leader,
    Snapshot { token: String },
    LoginAppRole { mount: String, role_id: String, secret_id: String },
    LoginKubernetes { mount: String, role: String, jwt: String },
}

fn fake_error(path: &str) -> VaultError {
    VaultError::Status {
        path: path.to_string(),
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        body: "fake failure".to_string(),
    }
}

pub struct FakeVault {
    is_self: bool,
    leader_error: bool,
    login_error: bool,
    open_error: bool,
    login_latency: Duration,
    chunks: Vec<Result<&'static [u8], ()>>,
    logins: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    shutdown_after: Mutex<Option<(usize, oneshot::Sender<()>)>>,
}

impl FakeVault {
    fn new(is_self: bool) -> Self {
        FakeVault {
            is_self,
            leader_error: false,
            login_error: false,
            open_error: false,
            login_latency: Duration::ZERO,
            chunks: vec![Ok(&b"raft-"[..]), Ok(&b"snapshot"[..])],
            logins: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            shutdown_after: Mutex::new(None),
        }
    }

    pub fn leader() -> Self {
        Self::new(true)
    }

    pub fn follower() -> Self {
        Self::new(false)
    }

    pub fn failing_leader_query(mut self) -> Self {
        self.leader_error = true;
        self
    }

    pub fn failing_login(mut self) -> Self {
        self.login_error = true;
        self
    }

    /// Logins answer only after `latency` of wall-clock time.
    pub fn slow_login(mut self, latency: Duration) -> Self {
        self.login_latency = latency;
        self
    }

    pub fn failing_snapshot_open(mut self) -> Self {
        self.open_error = true;
        self
    }

    pub fn with_chunks(mut self, chunks: Vec<Result<&'static [u8], ()>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Fires `tx` when the leader endpoint has been queried `cycles` times.
    pub fn shutdown_after(self, cycles: usize, tx: oneshot::Sender<()>) -> Self {
        *self.shutdown_after.lock().unwrap() = Some((cycles, tx));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn issue_token(&self) -> Result<AuthToken, VaultError> {
        if !self.login_latency.is_zero() {
            tokio::time::sleep(self.login_latency).await;
        }
        if self.login_error {
            return Err(fake_error("auth/login"));
        }
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AuthToken {
            client_token: format!("token-{n}"),
            lease_duration: 3600,
        })
    }
}

#[async_trait]
impl VaultApi for FakeVault {
    async fn leader_status(&self) -> Result<LeaderStatus, VaultError> {
        self.record(Call::Leader);

        let queries = self
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Leader))
            .count();
        let mut shutdown = self.shutdown_after.lock().unwrap();
        if shutdown.as_ref().is_some_and(|(after, _)| queries >= *after) {
            if let Some((_, tx)) = shutdown.take() {
                let _ = tx.send(());
            }
        }
        drop(shutdown);

        if self.leader_error {
            return Err(fake_error("sys/leader"));
        }
        Ok(LeaderStatus {
            ha_enabled: true,
            is_self: self.is_self,
            leader_address: "https://vault-0:8200".to_string(),
        })
    }

    async fn stream_snapshot(&self, token: &str) -> Result<SnapshotStream, VaultError> {
        self.record(Call::Snapshot {
            token: token.to_string(),
        });
        if self.open_error {
            return Err(fake_error("sys/storage/raft/snapshot"));
        }
        let chunks: Vec<Result<Bytes, VaultError>> = self
            .chunks
            .iter()
            .map(|chunk| match chunk {
                Ok(data) => Ok(Bytes::from_static(data)),
                Err(()) => Err(fake_error("sys/storage/raft/snapshot")),
            })
            .collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn login_approle(
        &self,
        mount_path: &str,
        role_id: &str,
        secret_id: &str,
    ) -> Result<AuthToken, VaultError> {
        self.record(Call::LoginAppRole {
            mount: mount_path.to_string(),
            role_id: role_id.to_string(),
            secret_id: secret_id.to_string(),
        });
        self.issue_token().await
    }

    async fn login_kubernetes(
        &self,
        mount_path: &str,
        role: &str,
        jwt: &str,
    ) -> Result<AuthToken, VaultError> {
        self.record(Call::LoginKubernetes {
            mount: mount_path.to_string(),
            role: role.to_string(),
            jwt: jwt.to_string(),
        });
        self.issue_token().await
    }
}

#[derive(Default)]
pub struct RecordingStore {
    static_name: bool,
    fail_write: bool,
    fail_prune: bool,
    stall_write: bool,
    writes: Mutex<Vec<Snapshot>>,
    prunes: Mutex<Vec<u64>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn static_name(mut self) -> Self {
        self.static_name = true;
        self
    }

    pub fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn failing_prune(mut self) -> Self {
        self.fail_prune = true;
        self
    }

    pub fn stalling_write(mut self) -> Self {
        self.stall_write = true;
        self
    }

    pub fn writes(&self) -> Vec<Snapshot> {
        self.writes.lock().unwrap().clone()
    }

    pub fn prunes(&self) -> Vec<u64> {
        self.prunes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for RecordingStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn location(&self) -> String {
        "/snapshots".to_string()
    }

    fn retention_enabled(&self) -> bool {
        !self.static_name
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<String, StorageError> {
        if self.stall_write {
            std::future::pending::<()>().await;
        }
        if self.fail_write {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.writes.lock().unwrap().push(snapshot.clone());
        Ok(format!("/snapshots/vault-raft-snap-{}.snap", snapshot.timestamp))
    }

    async fn prune(&self, retain: u64) -> Result<usize, StorageError> {
        self.prunes.lock().unwrap().push(retain);
        if self.fail_prune {
            return Err(StorageError::Io(std::io::Error::other("permission denied")));
        }
        Ok(0)
    }
}

pub fn auth_config(method: AuthMethod) -> AuthConfig {
    AuthConfig {
        method,
        role_id: "role-id".to_string(),
        secret_id: "secret-id".to_string(),
        approle_path: "approle".to_string(),
        k8s_role: "vault-snapshot".to_string(),
        k8s_auth_path: "kubernetes".to_string(),
        k8s_token_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"),
    }
}

pub fn agent_config(retain: u64) -> AgentConfig {
    AgentConfig {
        address: "https://127.0.0.1:8200".to_string(),
        retain,
        frequency: Duration::from_secs(3600),
        daemon: false,
        request_timeout: Duration::from_secs(30),
        insecure_tls: false,
        auth: auth_config(AuthMethod::AppRole),
        storage: StorageTarget::Local(LocalConfig {
            path: PathBuf::from("/snapshots"),
        }),
    }
}
