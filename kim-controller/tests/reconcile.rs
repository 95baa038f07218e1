use std::sync::Arc;

use kim_api::{
    find_condition, ConditionStatus, Effect, ObjectKey, Policy, PolicyRef, PolicySpec, Role,
    RoleSpec, Rule, SubjectRef, CONDITION_POLICIES_RESOLVED, CONDITION_SYNCED,
};
use kim_authz::{AuthzModel, Decision, PolicyEngine};
use kim_controller::{policy, role, Context, Error};
use kim_store::{Api, BoxFuture, Collection, Store, StoreError, WatchEvent};
use tokio::sync::broadcast;

fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

fn doc_reader() -> Policy {
    Policy::new(
        "default",
        "doc-reader",
        PolicySpec {
            rules: vec![Rule::new("doc:1", &["read"], Effect::Allow)],
            subjects: vec![SubjectRef::new("u1", None)],
            ..Default::default()
        },
    )
}

fn setup() -> (Store, Arc<Context>, PolicyEngine) {
    let store = Store::new();
    let model = Arc::new(AuthzModel::new());
    let ctx = Arc::new(Context::from_store(&store, model.clone()));
    (store, ctx, PolicyEngine::new(model))
}

#[tokio::test]
async fn policy_reconcile_populates_the_model() {
    let (store, ctx, engine) = setup();
    store.policies().create(doc_reader()).await.unwrap();

    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();

    assert_eq!(engine.evaluate(&key("u1"), "doc:1", "read"), Decision::Allow);
    assert_eq!(engine.evaluate(&key("u1"), "doc:1", "write"), Decision::Deny);

    let stored = store.policies().get_sync(&key("doc-reader")).unwrap();
    let synced = find_condition(&stored.status.conditions, CONDITION_SYNCED).unwrap();
    assert_eq!(synced.status, ConditionStatus::True);
    assert_eq!(synced.observed_generation, 1);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let (store, ctx, _engine) = setup();
    store.policies().create(doc_reader()).await.unwrap();

    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();
    let revision = ctx.model.revision();
    let first = store.policies().get_sync(&key("doc-reader")).unwrap();

    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();
    let second = store.policies().get_sync(&key("doc-reader")).unwrap();

    assert_eq!(ctx.model.revision(), revision);
    assert_eq!(second.status.conditions, first.status.conditions);
    assert_eq!(second.status.conditions.len(), 1);
    assert_eq!(
        second.metadata.resource_version,
        first.metadata.resource_version
    );
}

#[tokio::test]
async fn deleted_policy_is_removed_from_the_model() {
    let (store, ctx, engine) = setup();
    store.policies().create(doc_reader()).await.unwrap();
    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();

    store.policies().delete(&key("doc-reader")).await.unwrap();
    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();

    assert_eq!(engine.evaluate(&key("u1"), "doc:1", "read"), Decision::Deny);
    assert_eq!(ctx.model.policy_count(), 0);

    // Reconciling an absent key again is still a success.
    policy::reconcile(key("doc-reader"), ctx).await.unwrap();
}

#[tokio::test]
async fn invalid_statement_keeps_last_good_state() {
    let (store, ctx, engine) = setup();
    let created = store.policies().create(doc_reader()).await.unwrap();
    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();

    let mut broken = store.policies().get_sync(&key("doc-reader")).unwrap();
    broken.spec.statement = "{not json".into();
    store.policies().update(broken).await.unwrap();

    let err = policy::reconcile(key("doc-reader"), ctx.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
    assert!(!err.is_retryable());

    let stored = store.policies().get_sync(&key("doc-reader")).unwrap();
    let synced = find_condition(&stored.status.conditions, CONDITION_SYNCED).unwrap();
    assert_eq!(synced.status, ConditionStatus::False);
    assert_eq!(synced.reason, "InvalidSpec");
    assert_eq!(synced.observed_generation, created.metadata.generation + 1);

    assert_eq!(engine.evaluate(&key("u1"), "doc:1", "read"), Decision::Allow);
}

#[tokio::test]
async fn role_reports_missing_policies_until_they_exist() {
    let (store, ctx, engine) = setup();
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

    role::reconcile(key("readers"), ctx.clone()).await.unwrap();
    let stored = store.roles().get_sync(&key("readers")).unwrap();
    let resolved = find_condition(&stored.status.conditions, CONDITION_POLICIES_RESOLVED).unwrap();
    assert_eq!(resolved.status, ConditionStatus::False);
    assert!(resolved.message.contains("default/doc-reader"));
    assert_eq!(engine.evaluate(&key("bob"), "doc:1", "read"), Decision::Deny);

    store.policies().create(doc_reader()).await.unwrap();
    policy::reconcile(key("doc-reader"), ctx.clone()).await.unwrap();
    assert_eq!(ctx.model.roles_referencing(&key("doc-reader")), vec![key("readers")]);
    assert_eq!(engine.evaluate(&key("bob"), "doc:1", "read"), Decision::Allow);

    role::reconcile(key("readers"), ctx.clone()).await.unwrap();
    let stored = store.roles().get_sync(&key("readers")).unwrap();
    let resolved = find_condition(&stored.status.conditions, CONDITION_POLICIES_RESOLVED).unwrap();
    assert_eq!(resolved.status, ConditionStatus::True);
    assert_eq!(stored.status.conditions.len(), 2);
}

#[tokio::test]
async fn role_direct_rules_and_deletion() {
    let (store, ctx, engine) = setup();
    store
        .roles()
        .create(Role::new(
            "default",
            "ops",
            RoleSpec {
                rules: vec![Rule::new("server:*", &["restart"], Effect::Allow)],
                subjects: vec![SubjectRef::new("carol", None)],
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    role::reconcile(key("ops"), ctx.clone()).await.unwrap();
    assert_eq!(
        engine.evaluate(&key("carol"), "server:web-1", "restart"),
        Decision::Allow
    );
    assert_eq!(engine.roles_for(&key("carol")), vec![key("ops")]);

    store.roles().delete(&key("ops")).await.unwrap();
    role::reconcile(key("ops"), ctx.clone()).await.unwrap();
    assert_eq!(
        engine.evaluate(&key("carol"), "server:web-1", "restart"),
        Decision::Deny
    );
}

/// Delegates to a collection but refuses every status write.
struct ReadOnlyStatus(Arc<Collection<Policy>>);

impl Api<Policy> for ReadOnlyStatus {
    fn get<'a>(&'a self, key: &'a ObjectKey) -> BoxFuture<'a, Result<Option<Policy>, StoreError>> {
        self.0.get(key)
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<Policy>, StoreError>> {
        self.0.list()
    }

    fn create(&self, resource: Policy) -> BoxFuture<'_, Result<Policy, StoreError>> {
        self.0.create(resource)
    }

    fn update(&self, resource: Policy) -> BoxFuture<'_, Result<Policy, StoreError>> {
        self.0.update(resource)
    }

    fn apply(&self, resource: Policy) -> BoxFuture<'_, Result<Policy, StoreError>> {
        self.0.apply(resource)
    }

    fn delete<'a>(&'a self, key: &'a ObjectKey) -> BoxFuture<'a, Result<(), StoreError>> {
        self.0.delete(key)
    }

    fn replace_status(&self, _resource: Policy) -> BoxFuture<'_, Result<Policy, StoreError>> {
        Box::pin(async { Err(StoreError::Unavailable("status disabled".into())) })
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.0.watch()
    }
}

#[tokio::test]
async fn status_failures_do_not_block_the_model() {
    let store = Store::new();
    let model = Arc::new(AuthzModel::new());
    let ctx = Arc::new(Context::new(
        Arc::new(ReadOnlyStatus(store.policies())),
        store.roles(),
        model.clone(),
    ));
    store.policies().create(doc_reader()).await.unwrap();

    policy::reconcile(key("doc-reader"), ctx).await.unwrap();

    let engine = PolicyEngine::new(model);
    assert_eq!(engine.evaluate(&key("u1"), "doc:1", "read"), Decision::Allow);
    let stored = store.policies().get_sync(&key("doc-reader")).unwrap();
    assert!(stored.status.conditions.is_empty());
}
