// vault-raft-snapshot-agent/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "./snapshot.json";
pub const DEFAULT_VAULT_ADDR: &str = "https://127.0.0.1:8200";
pub const DEFAULT_APPROLE_PATH: &str = "approle";
pub const DEFAULT_K8S_AUTH_PATH: &str = "kubernetes";
pub const DEFAULT_K8S_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const ENV_PREFIX: &str = "VRSA_";

// Structs for deserializing snapshot.json. They carry secrets verbatim, so
// only the parsed structs below implement `Debug`.
#[derive(Clone, Default, Deserialize)]
pub struct JsonLocalStorageConfig {
    pub path: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_key_prefix: Option<String>,
    #[serde(default)]
    pub s3_server_side_encryption: bool,
    pub s3_static_snapshot_name: Option<String>,
    #[serde(default)]
    pub s3_force_path_style: bool,
}

#[derive(Clone, Default, Deserialize)]
pub struct JsonGcsStorageConfig {
    pub bucket: Option<String>,
    pub service_account_path: Option<String>,
    pub key_prefix: Option<String>,
    pub static_snapshot_name: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
pub struct JsonAzureStorageConfig {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub container_name: Option<String>,
    pub key_prefix: Option<String>,
    pub static_snapshot_name: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub addr: Option<String>,
    pub retain: Option<u64>,
    pub frequency: Option<String>,
    pub daemon: Option<bool>,
    pub timeout: Option<String>,
    pub insecure_tls: Option<bool>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    pub approle: Option<String>,
    pub vault_auth_method: Option<String>,
    pub k8s_auth_role: Option<String>,
    pub k8s_auth_path: Option<String>,
    pub k8s_token_path: Option<String>,
    pub local_storage: Option<JsonLocalStorageConfig>,
    pub aws_storage: Option<JsonS3StorageConfig>,
    pub google_storage: Option<JsonGcsStorageConfig>,
    pub azure_storage: Option<JsonAzureStorageConfig>,
}

// Agent's internal configuration structs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    AppRole,
    Kubernetes,
}

impl AuthMethod {
    /// `k8s` selects Kubernetes auth; anything else, including an empty
    /// value, means AppRole.
    pub fn from_selector(selector: &str) -> Self {
        match selector.trim() {
            "k8s" => AuthMethod::Kubernetes,
            _ => AuthMethod::AppRole,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::AppRole => "approle",
            AuthMethod::Kubernetes => "k8s",
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub method: AuthMethod,
    pub role_id: String,
    pub secret_id: String,
    pub approle_path: String,
    pub k8s_role: String,
    pub k8s_auth_path: String,
    pub k8s_token_path: PathBuf,
}

const REDACTED: &str = "<redacted>";

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| REDACTED)
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("method", &self.method)
            .field("role_id", &self.role_id)
            .field("secret_id", &REDACTED)
            .field("approle_path", &self.approle_path)
            .field("k8s_role", &self.k8s_role)
            .field("k8s_auth_path", &self.k8s_auth_path)
            .field("k8s_token_path", &self.k8s_token_path)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalConfig {
    pub path: PathBuf,
}

#[derive(Clone, PartialEq)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub key_prefix: String,
    pub server_side_encryption: bool,
    pub force_path_style: bool,
    pub static_snapshot_name: Option<String>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("key_prefix", &self.key_prefix)
            .field("server_side_encryption", &self.server_side_encryption)
            .field("force_path_style", &self.force_path_style)
            .field("static_snapshot_name", &self.static_snapshot_name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GcsConfig {
    pub bucket: String,
    pub service_account_path: Option<String>,
    pub key_prefix: String,
    pub static_snapshot_name: Option<String>,
}

#[derive(Clone, PartialEq)]
pub struct AzureConfig {
    pub account_name: String,
    pub account_key: Option<String>,
    pub container_name: String,
    pub key_prefix: String,
    pub static_snapshot_name: Option<String>,
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &redact(&self.account_key))
            .field("container_name", &self.container_name)
            .field("key_prefix", &self.key_prefix)
            .field("static_snapshot_name", &self.static_snapshot_name)
            .finish()
    }
}

/// The one destination a cycle writes to.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageTarget {
    Local(LocalConfig),
    Aws(S3Config),
    Gcp(GcsConfig),
    Azure(AzureConfig),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: String,
    /// 0 disables pruning.
    pub retain: u64,
    pub frequency: Duration,
    pub daemon: bool,
    pub request_timeout: Duration,
    pub insecure_tls: bool,
    pub auth: AuthConfig,
    pub storage: StorageTarget,
}

impl AgentConfig {
    /// Loads `.env`, reads the JSON file, applies `VRSA_*` overrides and
    /// normalizes the result.
    pub fn load(config_path: &Path) -> Result<Self> {
        // A missing .env is fine.
        let _ = dotenv::dotenv();

        let mut raw = read_raw_config(config_path)?;
        apply_env_overrides(&mut raw, |key| std::env::var(key).ok())?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let storage = select_storage_target(&raw)?;

        let request_timeout = match non_empty(&raw.timeout) {
            Some(value) => humantime::parse_duration(&value)
                .with_context(|| format!("Invalid timeout value in configuration: {value}"))?,
            None => DEFAULT_TIMEOUT,
        };

        let auth = AuthConfig {
            method: AuthMethod::from_selector(raw.vault_auth_method.as_deref().unwrap_or_default()),
            role_id: raw.role_id.clone().unwrap_or_default(),
            secret_id: raw.secret_id.clone().unwrap_or_default(),
            approle_path: non_empty(&raw.approle).unwrap_or_else(|| DEFAULT_APPROLE_PATH.to_string()),
            k8s_role: raw.k8s_auth_role.clone().unwrap_or_default(),
            k8s_auth_path: non_empty(&raw.k8s_auth_path)
                .unwrap_or_else(|| DEFAULT_K8S_AUTH_PATH.to_string()),
            k8s_token_path: PathBuf::from(
                non_empty(&raw.k8s_token_path).unwrap_or_else(|| DEFAULT_K8S_TOKEN_PATH.to_string()),
            ),
        };

        Ok(AgentConfig {
            address: non_empty(&raw.addr).unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string()),
            retain: raw.retain.unwrap_or(0),
            frequency: parse_frequency(raw.frequency.as_deref().unwrap_or_default()),
            daemon: raw.daemon.unwrap_or(false),
            request_timeout,
            insecure_tls: raw.insecure_tls.unwrap_or(false),
            auth,
            storage,
        })
    }
}

pub fn read_raw_config(config_path: &Path) -> Result<RawJsonConfig> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
    serde_json::from_str(&config_content).with_context(|| {
        format!(
            "Failed to parse JSON from config file at {}",
            config_path.display()
        )
    })
}

/// Overlays `VRSA_*` variables onto the file values. `lookup` is injected so
/// tests don't touch the process environment.
pub fn apply_env_overrides<F>(raw: &mut RawJsonConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

    if let Some(v) = var("ADDR") {
        raw.addr = Some(v);
    }
    if let Some(v) = var("RETAIN") {
        raw.retain = Some(
            v.trim().parse().with_context(|| {
                format!("{ENV_PREFIX}RETAIN must be a non-negative integer, got {v}")
            })?,
        );
    }
    if let Some(v) = var("FREQUENCY") {
        raw.frequency = Some(v);
    }
    if let Some(v) = var("DAEMON") {
        raw.daemon = Some(
            parse_bool(&v).with_context(|| format!("{ENV_PREFIX}DAEMON is not a boolean: {v}"))?,
        );
    }
    if let Some(v) = var("TIMEOUT") {
        raw.timeout = Some(v);
    }
    if let Some(v) = var("ROLE_ID") {
        raw.role_id = Some(v);
    }
    if let Some(v) = var("SECRET_ID") {
        raw.secret_id = Some(v);
    }
    if let Some(v) = var("APPROLE") {
        raw.approle = Some(v);
    }
    if let Some(v) = var("VAULT_AUTH_METHOD") {
        raw.vault_auth_method = Some(v);
    }
    if let Some(v) = var("K8S_AUTH_ROLE") {
        raw.k8s_auth_role = Some(v);
    }
    if let Some(v) = var("K8S_AUTH_PATH") {
        raw.k8s_auth_path = Some(v);
    }
    Ok(())
}

/// Picks the destination by fixed precedence: local, then AWS, then GCP,
/// then Azure. The first one with its identifying field set wins.
pub fn select_storage_target(raw: &RawJsonConfig) -> Result<StorageTarget> {
    if let Some(path) = raw.local_storage.as_ref().and_then(|l| non_empty(&l.path)) {
        return Ok(StorageTarget::Local(LocalConfig {
            path: PathBuf::from(path),
        }));
    }

    if let Some(aws) = raw.aws_storage.as_ref() {
        if let Some(bucket) = non_empty(&aws.s3_bucket) {
            return Ok(StorageTarget::Aws(S3Config {
                bucket,
                region: non_empty(&aws.s3_region),
                endpoint: non_empty(&aws.s3_endpoint),
                access_key_id: non_empty(&aws.access_key_id),
                secret_access_key: non_empty(&aws.secret_access_key),
                key_prefix: aws.s3_key_prefix.clone().unwrap_or_default(),
                server_side_encryption: aws.s3_server_side_encryption,
                force_path_style: aws.s3_force_path_style,
                static_snapshot_name: non_empty(&aws.s3_static_snapshot_name),
            }));
        }
    }

    if let Some(gcp) = raw.google_storage.as_ref() {
        if let Some(bucket) = non_empty(&gcp.bucket) {
            return Ok(StorageTarget::Gcp(GcsConfig {
                bucket,
                service_account_path: non_empty(&gcp.service_account_path),
                key_prefix: gcp.key_prefix.clone().unwrap_or_default(),
                static_snapshot_name: non_empty(&gcp.static_snapshot_name),
            }));
        }
    }

    if let Some(azure) = raw.azure_storage.as_ref() {
        if let Some(container_name) = non_empty(&azure.container_name) {
            let account_name = non_empty(&azure.account_name)
                .context("azure_storage.account_name must be set when container_name is configured")?;
            return Ok(StorageTarget::Azure(AzureConfig {
                account_name,
                account_key: non_empty(&azure.account_key),
                container_name,
                key_prefix: azure.key_prefix.clone().unwrap_or_default(),
                static_snapshot_name: non_empty(&azure.static_snapshot_name),
            }));
        }
    }

    anyhow::bail!(
        "No storage destination configured. Set one of local_storage.path, aws_storage.s3_bucket, \
         google_storage.bucket or azure_storage.container_name"
    )
}

/// Parses the schedule interval, falling back to one hour.
pub fn parse_frequency(value: &str) -> Duration {
    let value = value.trim();
    if value.is_empty() {
        return DEFAULT_FREQUENCY;
    }
    match humantime::parse_duration(value) {
        Ok(frequency) if !frequency.is_zero() => frequency,
        Ok(_) => {
            tracing::warn!(frequency = value, "zero frequency configured, using 1h");
            DEFAULT_FREQUENCY
        }
        Err(e) => {
            tracing::warn!(frequency = value, error = %e, "unparseable frequency, using 1h");
            DEFAULT_FREQUENCY
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("expected true/false, got {other}")),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
