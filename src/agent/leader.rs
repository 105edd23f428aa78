use crate::errors::CycleError;
use crate::vault::VaultApi;

/// Asks Vault whether this node is the active leader. A failed query is an
/// error: non-leadership can't be assumed.
pub async fn is_leader<A: VaultApi>(api: &A) -> Result<bool, CycleError> {
    let status = api.leader_status().await.map_err(CycleError::LeaderQuery)?;

    if !status.is_self {
        tracing::info!(
            leader = %status.leader_address,
            ha_enabled = status.ha_enabled,
            "Not running on leader node, skipping."
        );
    }
    Ok(status.is_self)
}
