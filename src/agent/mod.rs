//! Snapshot orchestration: token lifecycle, leader gating, capture and the
//! backup cycle driven by the scheduler.

pub(crate) mod auth;
pub(crate) mod capture;
pub(crate) mod leader;
pub(crate) mod runner;
pub(crate) mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};

use crate::vault::VaultApi;

pub use scheduler::{listen_for_shutdown_signals, run_daemon, run_once};

/// The token currently held, paired with its expiry. Replaced as a whole
/// on every login so the two never drift apart.
#[derive(Clone)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Default for AuthSession {
    /// No token, expired at the epoch: forces a login on first use.
    fn default() -> Self {
        AuthSession {
            token: String::new(),
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process-lifetime state: the Vault API handle and the current session.
#[derive(Debug)]
pub struct Snapshotter<A> {
    api: A,
    session: AuthSession,
}

impl<A: VaultApi> Snapshotter<A> {
    pub fn new(api: A) -> Self {
        Snapshotter {
            api,
            session: AuthSession::default(),
        }
    }

    /// Starts from an existing session instead of the expired default.
    #[cfg(test)]
    pub fn with_session(api: A, session: AuthSession) -> Self {
        Snapshotter { api, session }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }
}
