use std::time::Duration;

use kim_core::config::{ConfigError, ConfigValue, KimConfig};
use serial_test::serial;

#[test]
fn flattens_nested_yaml() {
    let yaml = r#"
oidc:
  issuer: "http://localhost:9998/"
  access-token-ttl: 5m
controller:
  workers: 8
"#;
    let config = KimConfig::from_yaml_str(yaml, "test").unwrap();

    assert_eq!(
        config.get::<String>("oidc.issuer").unwrap(),
        "http://localhost:9998/"
    );
    assert_eq!(
        config.get::<Duration>("oidc.access-token-ttl").unwrap(),
        Duration::from_secs(300)
    );
    assert_eq!(config.get::<usize>("controller.workers").unwrap(), 8);
    assert!(matches!(
        config.get::<String>("oidc.missing"),
        Err(ConfigError::NotFound(_))
    ));
}

#[test]
fn lists_of_maps_are_kept_whole() {
    let yaml = r#"
oidc:
  clients:
    - id: web
      redirect-uris: ["http://localhost:3000/"]
    - id: native
"#;
    let config = KimConfig::from_yaml_str(yaml, "test").unwrap();
    let clients: Vec<ConfigValue> = config.get("oidc.clients").unwrap();
    assert_eq!(clients.len(), 2);
    assert_eq!(
        clients[0].field("id"),
        Some(&ConfigValue::String("web".into()))
    );
    assert_eq!(config.get::<String>("oidc.clients.1.id").unwrap(), "native");
}

#[test]
#[serial]
fn profile_file_and_env_override_base() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kim.yaml"),
        "oidc:\n  issuer: base\ncontroller:\n  workers: 2\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("kim-prod.yaml"), "oidc:\n  issuer: prod\n").unwrap();

    unsafe { std::env::set_var("KIM_CONTROLLER__WORKERS", "16") };
    let config = KimConfig::load_from(dir.path(), "prod").unwrap();
    unsafe { std::env::remove_var("KIM_CONTROLLER__WORKERS") };

    assert_eq!(config.profile(), "prod");
    assert_eq!(config.get::<String>("oidc.issuer").unwrap(), "prod");
    assert_eq!(config.get::<usize>("controller.workers").unwrap(), 16);
}

#[test]
#[serial]
fn profile_env_var_wins_over_argument() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kim-staging.yaml"), "telemetry:\n  filter: debug\n").unwrap();

    unsafe { std::env::set_var("KIM_PROFILE", "staging") };
    let config = KimConfig::load_from(dir.path(), "dev").unwrap();
    unsafe { std::env::remove_var("KIM_PROFILE") };

    assert_eq!(config.profile(), "staging");
    assert_eq!(config.get::<String>("telemetry.filter").unwrap(), "debug");
}

#[test]
#[serial]
fn placeholders_resolve_from_env() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("kim.yaml"),
        "oidc:\n  issuer: \"https://${KIM_TEST_HOST}/\"\n",
    )
    .unwrap();

    unsafe { std::env::set_var("KIM_TEST_HOST", "idp.example.com") };
    let config = KimConfig::load_from(dir.path(), "dev").unwrap();
    unsafe { std::env::remove_var("KIM_TEST_HOST") };

    assert_eq!(
        config.get::<String>("oidc.issuer").unwrap(),
        "https://idp.example.com/"
    );
}

#[test]
fn malformed_yaml_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kim.yaml"), "oidc: [unterminated\n").unwrap();
    assert!(matches!(
        KimConfig::load_from(dir.path(), "dev"),
        Err(ConfigError::Load(_))
    ));
}
