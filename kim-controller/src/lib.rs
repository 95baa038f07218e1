//! Reconcilers that keep the authorization model in step with Policy and
//! Role resources, and the runtime that drives them.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod policy;
pub mod role;
pub mod runtime;
pub mod status;

use std::sync::Arc;

use kim_api::{ObjectKey, Resource};
use tokio_util::sync::CancellationToken;

pub use action::{backoff, error_policy, Action};
pub use config::ControllerConfig;
pub use context::Context;
pub use error::Error;
pub use runtime::{Controller, QueueHandle};

/// Run the Policy and Role controllers until `shutdown` is cancelled.
///
/// A reconciled Policy enqueues every Role referencing it, so Role status
/// follows Policy creation and deletion.
pub async fn run(ctx: Arc<Context>, config: ControllerConfig, shutdown: CancellationToken) {
    let role_ctx = ctx.clone();
    let roles = Controller::new(ctx.roles.clone(), config.clone(), move |key| {
        role::reconcile(key, role_ctx.clone())
    })
    .known_keys({
        let model = ctx.model.clone();
        move || model.role_keys()
    });

    let role_queue = roles.handle();
    let policy_ctx = ctx.clone();
    let policies = Controller::new(ctx.policies.clone(), config, move |key| {
        policy::reconcile(key, policy_ctx.clone())
    })
    .known_keys({
        let model = ctx.model.clone();
        move || model.policy_keys()
    })
    .on_reconciled({
        let model = ctx.model.clone();
        move |policy| {
            for role in model.roles_referencing(policy) {
                role_queue.enqueue(role);
            }
        }
    });

    tokio::join!(policies.run(shutdown.clone()), roles.run(shutdown));
}

/// Reconcile every Policy, then every Role, once. Returns the keys that
/// failed.
pub async fn reconcile_all(ctx: &Arc<Context>) -> Result<Vec<(ObjectKey, Error)>, Error> {
    let mut failures = Vec::new();
    for policy in ctx.policies.list().await? {
        let key = policy.key();
        if let Err(e) = policy::reconcile(key.clone(), ctx.clone()).await {
            failures.push((key, e));
        }
    }
    for role in ctx.roles.list().await? {
        let key = role.key();
        if let Err(e) = role::reconcile(key.clone(), ctx.clone()).await {
            failures.push((key, e));
        }
    }
    Ok(failures)
}
