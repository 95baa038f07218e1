use std::sync::Arc;
use std::time::Duration;

use kim_api::{
    find_condition, ConditionStatus, Effect, ObjectKey, Policy, PolicyRef, PolicySpec, Role,
    RoleSpec, Rule, SubjectRef, CONDITION_POLICIES_RESOLVED,
};
use kim_authz::{AuthzModel, Decision, PolicyEngine};
use kim_controller::{Context, ControllerConfig};
use kim_store::{Api, Store};
use tokio_util::sync::CancellationToken;

fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

fn fast_config() -> ControllerConfig {
    ControllerConfig {
        workers: 2,
        requeue_base: Duration::from_millis(10),
        requeue_max: Duration::from_millis(100),
        resync: Duration::from_secs(60),
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn start(store: &Store) -> (PolicyEngine, CancellationToken, tokio::task::JoinHandle<()>) {
    let model = Arc::new(AuthzModel::new());
    let ctx = Arc::new(Context::from_store(store, model.clone()));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(kim_controller::run(ctx, fast_config(), shutdown.clone()));
    (PolicyEngine::new(model), shutdown, handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn controllers_follow_store_changes() {
    let store = Store::new();
    // Present before start: picked up by the initial list.
    store
        .policies()
        .create(Policy::new(
            "default",
            "base",
            PolicySpec {
                rules: vec![Rule::new("doc:*", &["read"], Effect::Allow)],
                subjects: vec![SubjectRef::new("u1", None)],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    let (engine, shutdown, handle) = start(&store);

    eventually(|| engine.evaluate(&key("u1"), "doc:1", "read") == Decision::Allow).await;

    // Added while running: picked up by the watch.
    store
        .policies()
        .create(Policy::new(
            "default",
            "no-secret",
            PolicySpec {
                rules: vec![Rule::new("doc:secret", &["read"], Effect::Deny)],
                subjects: vec![SubjectRef::new("u1", None)],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    eventually(|| engine.evaluate(&key("u1"), "doc:secret", "read") == Decision::Deny).await;
    assert_eq!(engine.evaluate(&key("u1"), "doc:1", "read"), Decision::Allow);

    store.policies().delete(&key("base")).await.unwrap();
    eventually(|| engine.evaluate(&key("u1"), "doc:1", "read") == Decision::Deny).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn role_status_follows_referenced_policy() {
    let store = Store::new();
    store
        .roles()
        .create(Role::new(
            "default",
            "readers",
            RoleSpec {
                policy_refs: vec![PolicyRef::new("doc-reader")],
                subjects: vec![SubjectRef::new("bob", None)],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    let (engine, shutdown, handle) = start(&store);

    let roles = store.roles();
    let resolved = |status: ConditionStatus| {
        let roles = roles.clone();
        move || {
            roles
                .get_sync(&key("readers"))
                .and_then(|r| {
                    find_condition(&r.status.conditions, CONDITION_POLICIES_RESOLVED)
                        .map(|c| c.status)
                })
                == Some(status)
        }
    };
    eventually(resolved(ConditionStatus::False)).await;

    store
        .policies()
        .create(Policy::new(
            "default",
            "doc-reader",
            PolicySpec {
                rules: vec![Rule::new("doc:1", &["read"], Effect::Allow)],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    eventually(resolved(ConditionStatus::True)).await;
    assert_eq!(engine.evaluate(&key("bob"), "doc:1", "read"), Decision::Allow);

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rapid_updates_converge_on_the_latest_version() {
    let store = Store::new();
    let (engine, shutdown, handle) = start(&store);
    let policies = store.policies();

    let mut current = policies
        .create(Policy::new(
            "default",
            "churn",
            PolicySpec {
                rules: vec![Rule::new("doc:0", &["read"], Effect::Allow)],
                subjects: vec![SubjectRef::new("u1", None)],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    for i in 1..=20 {
        current = policies.get_sync(&key("churn")).unwrap_or(current);
        current.spec.rules = vec![Rule::new(format!("doc:{i}"), &["read"], Effect::Allow)];
        current = policies.apply(current).await.unwrap();
    }

    eventually(|| engine.evaluate(&key("u1"), "doc:20", "read") == Decision::Allow).await;
    assert_eq!(engine.evaluate(&key("u1"), "doc:19", "read"), Decision::Deny);

    shutdown.cancel();
    handle.await.unwrap();
}
