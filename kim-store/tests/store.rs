use kim_api::{Effect, ObjectKey, Policy, PolicySpec, Role, RoleSpec, Rule, User, UserSpec};
use kim_store::{Api, EventKind, Store, StoreError};

fn policy(name: &str) -> Policy {
    Policy::new(
        "default",
        name,
        PolicySpec {
            rules: vec![Rule::new("doc:1", &["read"], Effect::Allow)],
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn create_then_get() {
    let store = Store::new();
    let policies = store.policies();
    let created = policies.create(policy("reader")).await.unwrap();
    assert_eq!(created.metadata.generation, 1);
    assert!(created.metadata.uid.is_some());

    let fetched = policies
        .get(&ObjectKey::new("default", "reader"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn missing_resource_is_none() {
    let store = Store::new();
    let got = store
        .roles()
        .get(&ObjectKey::new("default", "nope"))
        .await
        .unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let store = Store::new();
    let policies = store.policies();
    policies.create(policy("p")).await.unwrap();
    let err = policies.create(policy("p")).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[tokio::test]
async fn stale_update_conflicts() {
    let store = Store::new();
    let policies = store.policies();
    let created = policies.create(policy("p")).await.unwrap();

    let mut first = created.clone();
    first.spec.description = "first".into();
    policies.update(first).await.unwrap();

    let mut second = created;
    second.spec.description = "second".into();
    let err = policies.update(second).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn stale_status_write_conflicts() {
    let store = Store::new();
    let policies = store.policies();
    let created = policies.create(policy("p")).await.unwrap();
    policies.apply(policy("p")).await.unwrap();

    let err = policies.replace_status(created).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));
}

#[tokio::test]
async fn invalid_resource_is_rejected() {
    let store = Store::new();
    let mut bad = policy("bad");
    bad.spec.rules[0].effect = "allow".into();
    let err = store.policies().create(bad).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(store.policies().is_empty());
}

#[tokio::test]
async fn watch_reports_spec_writes_and_deletes() {
    let store = Store::new();
    let roles = store.roles();
    let mut events = roles.watch();

    let role = Role::new("team", "ops", RoleSpec::default());
    let created = roles.create(role).await.unwrap();
    roles.replace_status(created.clone()).await.unwrap();
    roles.delete(&created.metadata.key()).await.unwrap();

    let applied = events.recv().await.unwrap();
    assert_eq!(applied.kind, EventKind::Applied);
    assert_eq!(applied.key, ObjectKey::new("team", "ops"));

    // Status writes are silent; the next event is the delete.
    let deleted = events.recv().await.unwrap();
    assert_eq!(deleted.kind, EventKind::Deleted);
    assert!(deleted.resource_version > applied.resource_version);
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let store = Store::new();
    let err = store
        .policies()
        .delete(&ObjectKey::new("default", "ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

fn user(namespace: &str, name: &str) -> User {
    User::new(
        namespace,
        name,
        UserSpec {
            secret_name: "credentials".into(),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn names_that_cannot_form_a_subject_are_rejected() {
    let store = Store::new();
    let users = store.users();
    for (namespace, name) in [("team-a", "alice/admin"), ("", ""), ("team-a", ""), ("team/a", "alice")] {
        let err = users.create(user(namespace, name)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)), "{namespace}/{name}: {err}");
        let err = users.apply(user(namespace, name)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
    assert!(users.is_empty());

    let created = users.create(user("team-a", "alice")).await.unwrap();
    let mut renamed = created.clone();
    renamed.metadata.name = "Alice".into();
    assert!(matches!(
        users.update(renamed).await.unwrap_err(),
        StoreError::Invalid(_)
    ));
}
