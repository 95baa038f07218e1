//! Best-effort status condition writes.
//!
//! A failed status write is logged and dropped; it never fails the reconcile
//! that produced it.

use kim_api::{set_condition, Condition, HasConditions};
use kim_store::{Api, StoreError};

/// Upsert `conditions` on `resource` and persist them.
///
/// Nothing is written when every condition is already present with the same
/// observation. A version conflict is retried once against the latest copy,
/// as long as its spec generation is unchanged; a newer generation gets its
/// own reconcile. Returns whether a write happened.
pub async fn update_conditions<R: HasConditions>(
    api: &dyn Api<R>,
    resource: &R,
    conditions: &[Condition],
) -> bool {
    let key = resource.key();
    let generation = resource.metadata().generation;
    let mut current = resource.clone();

    for attempt in 0..2 {
        let mut changed = false;
        for condition in conditions {
            changed |= set_condition(current.conditions_mut(), condition.clone());
        }
        if !changed {
            return false;
        }

        match api.replace_status(current).await {
            Ok(_) => return true,
            Err(StoreError::Conflict { .. }) if attempt == 0 => match api.get(&key).await {
                Ok(Some(latest)) if latest.metadata().generation == generation => {
                    current = latest;
                }
                Ok(_) => {
                    tracing::debug!(kind = R::KIND, key = %key, "resource changed, dropping status update");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(kind = R::KIND, key = %key, error = %e, "status refetch failed");
                    return false;
                }
            },
            Err(e) => {
                tracing::warn!(kind = R::KIND, key = %key, error = %e, "status update failed");
                return false;
            }
        }
    }
    false
}
