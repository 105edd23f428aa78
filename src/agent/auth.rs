// vault-raft-snapshot-agent/src/agent/auth.rs
use chrono::{DateTime, TimeDelta, Utc};

use super::{AuthSession, Snapshotter};
use crate::config::{AuthConfig, AuthMethod};
use crate::errors::{CycleError, VaultError};
use crate::vault::{AuthToken, VaultApi};

impl<A: VaultApi> Snapshotter<A> {
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.session.expires_at < now
    }

    /// Logs in again if the held token has expired. Returns whether a login
    /// happened. A failed login leaves the old (expired) session in place so
    /// the next cycle tries again.
    pub async fn ensure_token(&mut self, auth: &AuthConfig) -> Result<bool, CycleError> {
        if !self.token_expired(Utc::now()) {
            return Ok(false);
        }

        // Leases run from when the login was sent, not when it returned.
        let requested_at = Utc::now();
        let token = login(&self.api, auth).await.map_err(|source| CycleError::Auth {
            method: auth.method.as_str(),
            source,
        })?;

        self.session = AuthSession {
            expires_at: expiry_after(requested_at, token.lease_duration),
            token: token.client_token,
        };
        tracing::debug!(method = auth.method.as_str(), expires_at = %self.session.expires_at, "vault token refreshed");
        Ok(true)
    }
}

async fn login<A: VaultApi>(api: &A, auth: &AuthConfig) -> Result<AuthToken, VaultError> {
    match auth.method {
        AuthMethod::Kubernetes => {
            let jwt = tokio::fs::read_to_string(&auth.k8s_token_path)
                .await
                .map_err(|source| VaultError::ServiceAccountToken {
                    path: auth.k8s_token_path.display().to_string(),
                    source,
                })?;
            api.login_kubernetes(&auth.k8s_auth_path, &auth.k8s_role, jwt.trim())
                .await
        }
        AuthMethod::AppRole => {
            api.login_approle(&auth.approle_path, &auth.role_id, &auth.secret_id)
                .await
        }
    }
}

fn expiry_after(now: DateTime<Utc>, lease_seconds: u64) -> DateTime<Utc> {
    i64::try_from(lease_seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lease| now.checked_add_signed(lease))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
