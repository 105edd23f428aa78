// vault-raft-snapshot-agent/src/storage/retention.rs
//! Snapshot naming and retention planning shared by every backend.

use regex::Regex;
use std::sync::LazyLock;

pub const SNAPSHOT_PREFIX: &str = "vault-raft-snap-";
pub const SNAPSHOT_EXTENSION: &str = ".snap";

static SNAPSHOT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^vault-raft-snap-(\d+)\.snap$").expect("snapshot name pattern is valid")
});

/// `vault-raft-snap-{unix_nanos}.snap`
pub fn snapshot_file_name(timestamp: i64) -> String {
    format!("{SNAPSHOT_PREFIX}{timestamp}{SNAPSHOT_EXTENSION}")
}

/// Inverse of [`snapshot_file_name`]. Anything else is not ours.
pub fn parse_snapshot_timestamp(name: &str) -> Option<i64> {
    SNAPSHOT_NAME
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Object key for a remote store: the static name if one is configured,
/// otherwise the timestamped name. Both sit under `key_prefix`.
pub fn object_key(key_prefix: &str, static_name: Option<&str>, timestamp: i64) -> String {
    match static_name {
        Some(name) => format!("{key_prefix}{name}"),
        None => format!("{key_prefix}{}", snapshot_file_name(timestamp)),
    }
}

/// Timestamp of a listed key, if the key is a direct snapshot child of
/// `key_prefix`.
pub fn key_timestamp(key_prefix: &str, key: &str) -> Option<i64> {
    key.strip_prefix(key_prefix).and_then(parse_snapshot_timestamp)
}

/// Returns the entries to delete so that at most `retain` of the newest
/// remain. `retain == 0` keeps everything.
pub fn plan_pruning<T>(mut entries: Vec<(i64, T)>, retain: u64) -> Vec<T>
where
    T: Ord,
{
    if retain == 0 {
        return Vec::new();
    }
    let retain = usize::try_from(retain).unwrap_or(usize::MAX);
    if entries.len() <= retain {
        return Vec::new();
    }

    entries.sort();
    let excess = entries.len() - retain;
    entries.into_iter().take(excess).map(|(_, id)| id).collect()
}
