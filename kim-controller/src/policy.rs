//! Policy reconciler.

use std::sync::Arc;

use kim_api::{
    Condition, ConditionStatus, ObjectKey, Policy, Resource, CONDITION_SYNCED,
};
use kim_authz::{compile_policy, ApplyOutcome, PolicyFragment};
use tracing::instrument;

use crate::action::Action;
use crate::context::Context;
use crate::error::Error;
use crate::status::update_conditions;

pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Build the model fragment for a Policy.
pub fn policy_fragment(policy: &Policy) -> Result<PolicyFragment, Error> {
    policy.validate()?;
    let key = policy.key();
    let rules = compile_policy(&policy.spec, &key)?;
    let subjects = policy
        .spec
        .subjects
        .iter()
        .map(|s| s.resolve(&key.namespace))
        .collect();
    Ok(PolicyFragment {
        key,
        resource_version: policy.metadata.resource_version,
        rules,
        subjects,
    })
}

/// Converge the model entry for one Policy key with the store.
///
/// A missing Policy removes its contribution and succeeds. An invalid spec
/// keeps the last good fragment in the model and reports `Synced=False`.
#[instrument(skip(ctx), fields(policy = %key))]
pub async fn reconcile(key: ObjectKey, ctx: Arc<Context>) -> Result<Action, Error> {
    let Some(policy) = ctx.policies.get(&key).await? else {
        if ctx.model.remove_policy(&key) {
            tracing::info!("policy deleted, contribution removed");
        }
        return Ok(Action::await_change());
    };
    let generation = policy.metadata.generation;

    let fragment = match policy_fragment(&policy) {
        Ok(fragment) => fragment,
        Err(err) => {
            tracing::warn!(error = %err, "policy rejected");
            let condition = Condition::new(
                CONDITION_SYNCED,
                ConditionStatus::False,
                REASON_INVALID_SPEC,
                err.to_string(),
                generation,
            );
            update_conditions(ctx.policies.as_ref(), &policy, &[condition]).await;
            return Err(err);
        }
    };
    let rule_count = fragment.rules.len();

    match ctx.model.apply_policy(fragment) {
        ApplyOutcome::Applied => {
            tracing::info!(rules = rule_count, "policy synced");
        }
        ApplyOutcome::Unchanged => {
            tracing::debug!("policy unchanged");
        }
        ApplyOutcome::Stale { current } => {
            return Err(Error::TransientSync(format!(
                "observed version {} is older than model version {current}",
                policy.metadata.resource_version
            )));
        }
    }

    let condition = Condition::new(
        CONDITION_SYNCED,
        ConditionStatus::True,
        REASON_RECONCILED,
        format!("{rule_count} rules"),
        generation,
    );
    update_conditions(ctx.policies.as_ref(), &policy, &[condition]).await;
    Ok(Action::await_change())
}
