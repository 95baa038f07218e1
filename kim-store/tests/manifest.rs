use kim_api::ObjectKey;
use kim_store::{load_manifests, parse_manifests, Manifest, Store, StoreError};

const BUNDLE: &str = r#"
apiVersion: iam.kim.io/v1
kind: Policy
metadata:
  name: doc-reader
  namespace: default
spec:
  desc: read documents
  rules:
    - resource: "doc:*"
      actions: ["read"]
      effect: Allow
  subjects:
    - name: alice
---
kind: Role
metadata:
  name: editors
spec:
  policyRefs:
    - name: doc-reader
  subjects:
    - name: bob
---
---
kind: User
metadata:
  name: alice
spec:
  secretName: alice-credentials
  email: alice@example.com
---
kind: Secret
metadata:
  name: alice-credentials
data:
  password-hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"
"#;

#[test]
fn parses_multi_document_bundle() {
    let manifests = parse_manifests(BUNDLE).unwrap();
    let kinds: Vec<_> = manifests.iter().map(Manifest::kind).collect();
    assert_eq!(kinds, vec!["Policy", "Role", "User", "Secret"]);

    let Manifest::Role(role) = &manifests[1] else {
        panic!("expected a role");
    };
    assert_eq!(role.metadata.namespace, "default");
    assert_eq!(role.spec.policy_refs[0].name, "doc-reader");
}

#[test]
fn unknown_kind_is_invalid() {
    let err = parse_manifests("kind: Group\nmetadata:\n  name: x\n").unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[test]
fn loads_directory_in_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("10-policy.yaml"), BUNDLE).unwrap();
    std::fs::write(dir.path().join("README.md"), "not a manifest").unwrap();

    let manifests = load_manifests(dir.path()).unwrap();
    assert_eq!(manifests.len(), 4);

    let store = Store::new();
    assert_eq!(store.apply_manifests(manifests).unwrap(), 4);
    assert!(store
        .users()
        .get_sync(&ObjectKey::new("default", "alice"))
        .is_some());
}

#[test]
fn invalid_manifest_leaves_store_untouched() {
    let bundle = format!(
        "{BUNDLE}\n---\nkind: Policy\nmetadata:\n  name: broken\nspec:\n  rules:\n    - resource: x\n      actions: []\n      effect: Allow\n"
    );
    let store = Store::new();
    let err = store
        .apply_manifests(parse_manifests(&bundle).unwrap())
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(store.policies().is_empty());
}

#[test]
fn manifest_with_slash_in_name_is_rejected() {
    let bundle = format!(
        "{BUNDLE}\n---\nkind: User\nmetadata:\n  name: alice/admin\n  namespace: team-a\nspec:\n  secretName: alice-credentials\n"
    );
    let store = Store::new();
    let err = store
        .apply_manifests(parse_manifests(&bundle).unwrap())
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(msg) if msg.contains("metadata.name")));
    assert!(store.users().is_empty());
}

#[test]
fn missing_file_is_io_error() {
    let err = load_manifests("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}
