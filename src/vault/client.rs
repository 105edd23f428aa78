// vault-raft-snapshot-agent/src/vault/client.rs
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::{AuthToken, LeaderStatus, SnapshotStream, VaultApi};
use crate::errors::VaultError;

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    auth: Option<AuthToken>,
}

/// HTTP implementation of [`VaultApi`] over the Vault REST API.
#[derive(Debug, Clone)]
pub struct VaultClient {
    http: Client,
    base: Url,
}

impl VaultClient {
    /// Every request, body included, is bounded by `timeout`.
    pub fn new(address: &str, timeout: Duration, insecure_tls: bool) -> Result<Self, VaultError> {
        let http = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(VaultClient {
            http,
            base: api_base(address)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, VaultError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    async fn login(&self, path: String, body: serde_json::Value) -> Result<AuthToken, VaultError> {
        let url = self.endpoint(&path)?;
        tracing::debug!(%url, "logging in to vault");

        let response = self.http.post(url).json(&body).send().await?;
        let envelope: LoginEnvelope = check_status(&path, response).await?.json().await?;
        envelope.auth.ok_or(VaultError::MissingAuth(path))
    }
}

#[async_trait]
impl VaultApi for VaultClient {
    async fn leader_status(&self) -> Result<LeaderStatus, VaultError> {
        let path = "sys/leader";
        let response = self.http.get(self.endpoint(path)?).send().await?;
        Ok(check_status(path, response).await?.json().await?)
    }

    async fn stream_snapshot(&self, token: &str) -> Result<SnapshotStream, VaultError> {
        let path = "sys/storage/raft/snapshot";
        let response = self
            .http
            .get(self.endpoint(path)?)
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        let response = check_status(path, response).await?;
        tracing::debug!(content_length = ?response.content_length(), "snapshot stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(VaultError::from))
            .boxed())
    }

    async fn login_approle(
        &self,
        mount_path: &str,
        role_id: &str,
        secret_id: &str,
    ) -> Result<AuthToken, VaultError> {
        self.login(
            login_path(mount_path),
            json!({ "role_id": role_id, "secret_id": secret_id }),
        )
        .await
    }

    async fn login_kubernetes(
        &self,
        mount_path: &str,
        role: &str,
        jwt: &str,
    ) -> Result<AuthToken, VaultError> {
        self.login(login_path(mount_path), json!({ "role": role, "jwt": jwt }))
            .await
    }
}

/// `https://vault:8200` -> `https://vault:8200/v1/`, keeping any path prefix.
fn api_base(address: &str) -> Result<Url, VaultError> {
    let mut base = Url::parse(address.trim())?;
    let path = format!("{}/v1/", base.path().trim_end_matches('/'));
    base.set_path(&path);
    Ok(base)
}

fn login_path(mount_path: &str) -> String {
    format!("auth/{}/login", mount_path.trim_matches('/'))
}

async fn check_status(path: &str, response: Response) -> Result<Response, VaultError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VaultError::Status {
        path: path.to_string(),
        status,
        body,
    })
}
