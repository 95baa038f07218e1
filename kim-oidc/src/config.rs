use std::time::Duration;

use kim_core::{ConfigError, ConfigProperties, ConfigValue, KimConfig};

use crate::client::{Client, ClientRegistry};

/// Action checked when a token request carries only identity scopes.
pub const DEFAULT_ACTION: &str = "token:issue";

/// How a configured client is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKind {
    Native,
    Web { secret: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub id: String,
    pub kind: ClientKind,
    pub redirect_uris: Vec<String>,
    pub dev_mode: bool,
}

impl ClientConfig {
    fn parse(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        let field = |name: &str| -> Result<Option<String>, ConfigError> {
            match value.field(name) {
                None | Some(ConfigValue::Null) => Ok(None),
                Some(v) => kim_core::FromConfigValue::from_config_value(v, &format!("{key}.{name}"))
                    .map(Some),
            }
        };
        let invalid = |message: &str| ConfigError::Validation(vec![(key.to_string(), message.to_string())]);

        let id = field("id")?.filter(|id| !id.is_empty()).ok_or_else(|| invalid("id is required"))?;
        let kind = match field("type")?.as_deref().unwrap_or("web") {
            "native" => ClientKind::Native,
            "web" => ClientKind::Web {
                secret: field("secret")?.ok_or_else(|| invalid("web clients need a secret"))?,
            },
            other => return Err(invalid(format!("unknown client type '{other}'").as_str())),
        };
        let redirect_uris = match value.field("redirect-uris") {
            Some(v) => kim_core::FromConfigValue::from_config_value(v, &format!("{key}.redirect-uris"))?,
            None => Vec::new(),
        };
        let dev_mode = match value.field("dev-mode") {
            Some(v) => kim_core::FromConfigValue::from_config_value(v, &format!("{key}.dev-mode"))?,
            None => false,
        };
        Ok(Self {
            id,
            kind,
            redirect_uris,
            dev_mode,
        })
    }

    pub fn build(&self) -> Result<Client, crate::StorageError> {
        let client = match &self.kind {
            ClientKind::Native => Client::native(&self.id, self.redirect_uris.clone()),
            ClientKind::Web { secret } => Client::web(&self.id, secret, self.redirect_uris.clone())?,
        };
        Ok(client.with_dev_mode(self.dev_mode))
    }
}

/// Upper bound for every configured lifetime.
pub const MAX_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// `oidc.*` configuration section.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub issuer: String,
    pub signing_key_id: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub auth_request_ttl: Duration,
    pub device_lifetime: Duration,
    pub device_poll_interval: Duration,
    pub default_action: String,
    pub clients: Vec<ClientConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:9998".to_string(),
            signing_key_id: "kim-1".to_string(),
            access_token_ttl: Duration::from_secs(5 * 60),
            refresh_token_ttl: Duration::from_secs(5 * 60 * 60),
            auth_request_ttl: Duration::from_secs(30 * 60),
            device_lifetime: Duration::from_secs(5 * 60),
            device_poll_interval: Duration::from_secs(5),
            default_action: DEFAULT_ACTION.to_string(),
            clients: Vec::new(),
        }
    }
}

impl StorageConfig {
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.clients.push(client);
        self
    }

    /// Registry holding every configured client.
    pub fn client_registry(&self) -> Result<ClientRegistry, crate::StorageError> {
        let registry = ClientRegistry::new();
        for client in &self.clients {
            registry.register(client.build()?);
        }
        Ok(registry)
    }
}

impl ConfigProperties for StorageConfig {
    fn prefix() -> &'static str {
        "oidc"
    }

    fn from_config(config: &KimConfig) -> Result<Self, ConfigError> {
        let d = Self::default();
        let clients_key = Self::key("clients");
        let clients = match config.get_or::<ConfigValue>(&clients_key, ConfigValue::Null)? {
            ConfigValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| ClientConfig::parse(item, &format!("{clients_key}[{i}]")))
                .collect::<Result<Vec<_>, _>>()?,
            ConfigValue::Null => Vec::new(),
            _ => {
                return Err(ConfigError::TypeMismatch {
                    key: clients_key,
                    expected: "list",
                })
            }
        };

        let section = Self {
            issuer: config.get_or(&Self::key("issuer"), d.issuer)?,
            signing_key_id: config.get_or(&Self::key("signing-key-id"), d.signing_key_id)?,
            access_token_ttl: config.get_or(&Self::key("access-token-ttl"), d.access_token_ttl)?,
            refresh_token_ttl: config.get_or(&Self::key("refresh-token-ttl"), d.refresh_token_ttl)?,
            auth_request_ttl: config.get_or(&Self::key("auth-request-ttl"), d.auth_request_ttl)?,
            device_lifetime: config.get_or(&Self::key("device.lifetime"), d.device_lifetime)?,
            device_poll_interval: config
                .get_or(&Self::key("device.poll-interval"), d.device_poll_interval)?,
            default_action: config.get_or(&Self::key("default-action"), d.default_action)?,
            clients,
        };

        let mut problems = Vec::new();
        if section.issuer.is_empty() {
            problems.push((Self::key("issuer"), "must not be empty".to_string()));
        }
        if section.default_action.is_empty() {
            problems.push((Self::key("default-action"), "must not be empty".to_string()));
        }
        for (key, ttl) in [
            ("access-token-ttl", section.access_token_ttl),
            ("refresh-token-ttl", section.refresh_token_ttl),
            ("auth-request-ttl", section.auth_request_ttl),
            ("device.lifetime", section.device_lifetime),
            ("device.poll-interval", section.device_poll_interval),
        ] {
            if ttl > MAX_TTL {
                problems.push((Self::key(key), format!("must not exceed {}s", MAX_TTL.as_secs())));
            }
        }
        if section.device_poll_interval.is_zero() {
            problems.push((Self::key("device.poll-interval"), "must be positive".to_string()));
        }
        if !problems.is_empty() {
            return Err(ConfigError::Validation(problems));
        }
        Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_section_missing() {
        let config: StorageConfig = KimConfig::empty().section().unwrap();
        assert_eq!(config.device_lifetime, Duration::from_secs(300));
        assert_eq!(config.device_poll_interval, Duration::from_secs(5));
        assert_eq!(config.default_action, "token:issue");
        assert!(config.clients.is_empty());
    }

    #[test]
    fn reads_clients() {
        let yaml = r#"
oidc:
  issuer: https://id.example.com
  access-token-ttl: 10m
  device:
    poll-interval: 2
  clients:
    - id: native
      type: native
      redirect-uris: ["http://localhost/cb"]
    - id: web
      secret: s3cret
      redirect-uris: ["https://app/cb"]
      dev-mode: true
"#;
        let config: StorageConfig = KimConfig::from_yaml_str(yaml, "test").unwrap().section().unwrap();
        assert_eq!(config.issuer, "https://id.example.com");
        assert_eq!(config.access_token_ttl, Duration::from_secs(600));
        assert_eq!(config.device_poll_interval, Duration::from_secs(2));
        assert_eq!(config.clients.len(), 2);
        assert_eq!(config.clients[0].kind, ClientKind::Native);
        assert_eq!(
            config.clients[1].kind,
            ClientKind::Web {
                secret: "s3cret".into()
            }
        );
        assert!(config.clients[1].dev_mode);
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        let yaml = "oidc:\n  refresh-token-ttl: 9000000000h\n";
        let config = KimConfig::from_yaml_str(yaml, "test").unwrap();
        match config.section::<StorageConfig>() {
            Err(ConfigError::Validation(problems)) => {
                assert_eq!(problems.len(), 1);
                assert_eq!(problems[0].0, "oidc.refresh-token-ttl");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn web_client_without_secret_is_rejected() {
        let yaml = "oidc:\n  clients:\n    - id: web\n";
        let config = KimConfig::from_yaml_str(yaml, "test").unwrap();
        assert!(matches!(
            config.section::<StorageConfig>(),
            Err(ConfigError::Validation(_))
        ));
    }
}
