//! Role reconciler.

use std::sync::Arc;

use kim_api::{
    Condition, ConditionStatus, ObjectKey, Resource, Role, CONDITION_POLICIES_RESOLVED,
    CONDITION_SYNCED,
};
use kim_authz::{compile_rules, ApplyOutcome, RoleFragment, SourceKind};
use tracing::instrument;

use crate::action::Action;
use crate::context::Context;
use crate::error::Error;
use crate::policy::{REASON_INVALID_SPEC, REASON_RECONCILED};
use crate::status::update_conditions;

pub const REASON_ALL_RESOLVED: &str = "AllResolved";
pub const REASON_MISSING_POLICIES: &str = "MissingPolicies";

/// Build the model fragment for a Role.
pub fn role_fragment(role: &Role) -> Result<RoleFragment, Error> {
    role.validate()?;
    let key = role.key();
    let rules = compile_rules(&role.spec.rules, SourceKind::Role, &key)?;
    Ok(RoleFragment {
        policy_refs: role
            .spec
            .policy_refs
            .iter()
            .map(|r| r.resolve(&key.namespace))
            .collect(),
        subjects: role
            .spec
            .subjects
            .iter()
            .map(|s| s.resolve(&key.namespace))
            .collect(),
        resource_version: role.metadata.resource_version,
        rules,
        key,
    })
}

/// Converge the model entry for one Role key with the store.
///
/// Referenced Policies are resolved when decisions are evaluated, so a
/// missing reference is not an error: it contributes nothing until the
/// Policy appears and is reported through `PoliciesResolved`.
#[instrument(skip(ctx), fields(role = %key))]
pub async fn reconcile(key: ObjectKey, ctx: Arc<Context>) -> Result<Action, Error> {
    let Some(role) = ctx.roles.get(&key).await? else {
        if ctx.model.remove_role(&key) {
            tracing::info!("role deleted, contribution removed");
        }
        return Ok(Action::await_change());
    };
    let generation = role.metadata.generation;

    let fragment = match role_fragment(&role) {
        Ok(fragment) => fragment,
        Err(err) => {
            tracing::warn!(error = %err, "role rejected");
            let condition = Condition::new(
                CONDITION_SYNCED,
                ConditionStatus::False,
                REASON_INVALID_SPEC,
                err.to_string(),
                generation,
            );
            update_conditions(ctx.roles.as_ref(), &role, &[condition]).await;
            return Err(err);
        }
    };

    let mut missing = Vec::new();
    for policy in &fragment.policy_refs {
        if ctx.policies.get(policy).await?.is_none() {
            missing.push(policy.to_string());
        }
    }

    match ctx.model.apply_role(fragment) {
        ApplyOutcome::Applied => tracing::info!("role synced"),
        ApplyOutcome::Unchanged => tracing::debug!("role unchanged"),
        ApplyOutcome::Stale { current } => {
            return Err(Error::TransientSync(format!(
                "observed version {} is older than model version {current}",
                role.metadata.resource_version
            )));
        }
    }

    let resolved = if missing.is_empty() {
        Condition::new(
            CONDITION_POLICIES_RESOLVED,
            ConditionStatus::True,
            REASON_ALL_RESOLVED,
            "",
            generation,
        )
    } else {
        tracing::info!(missing = ?missing, "role references missing policies");
        Condition::new(
            CONDITION_POLICIES_RESOLVED,
            ConditionStatus::False,
            REASON_MISSING_POLICIES,
            format!("missing: {}", missing.join(", ")),
            generation,
        )
    };
    let synced = Condition::new(
        CONDITION_SYNCED,
        ConditionStatus::True,
        REASON_RECONCILED,
        "",
        generation,
    );
    update_conditions(ctx.roles.as_ref(), &role, &[synced, resolved]).await;
    Ok(Action::await_change())
}
