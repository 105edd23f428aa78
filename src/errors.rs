use thiserror::Error;

use crate::storage::BackendKind;

/// Failures talking to the Vault API.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Vault returned {status} for {path}: {body}")]
    Status {
        path: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Vault response for {0} has no auth block")]
    MissingAuth(String),

    #[error("Failed to read service account token from {path}: {source}")]
    ServiceAccountToken {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Failures inside a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("AWS SDK S3 error: {0}")]
    S3Sdk(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl<E, R> From<aws_sdk_s3::error::SdkError<E, R>> for StorageError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    fn from(err: aws_sdk_s3::error::SdkError<E, R>) -> Self {
        StorageError::S3Sdk(aws_sdk_s3::error::DisplayErrorContext(err).to_string())
    }
}

/// Everything that can end a backup cycle early.
///
/// None of these are fatal to the process: the scheduler logs them and waits
/// for the next tick (or exits non-zero in one-shot mode).
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("unable to authenticate with Vault ({method}): {source}")]
    Auth {
        method: &'static str,
        #[source]
        source: VaultError,
    },

    #[error(
        "unable to determine leader instance. The snapshot agent will only run on the leader node. \
         Are you running this daemon on a Vault instance? {0}"
    )]
    LeaderQuery(#[source] VaultError),

    #[error("unable to generate snapshot, {0}")]
    Capture(String),

    #[error("failed to generate {backend} snapshot to {destination}: {source}")]
    BackendWrite {
        backend: BackendKind,
        destination: String,
        #[source]
        source: StorageError,
    },
}

/// Pruning failed after the snapshot itself was stored.
#[derive(Error, Debug)]
#[error("failed to prune {backend} snapshots at {location}: {source}")]
pub struct RetentionError {
    pub backend: BackendKind,
    pub location: String,
    #[source]
    pub source: StorageError,
}

pub type Result<T> = std::result::Result<T, CycleError>;
