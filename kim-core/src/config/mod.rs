mod loader;
pub mod secrets;
pub mod typed;
pub mod value;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use secrets::{DefaultSecretResolver, SecretResolver};
pub use typed::ConfigProperties;
pub use value::{ConfigValue, FromConfigValue};

/// Prefix of environment variables that overlay file configuration.
pub const ENV_PREFIX: &str = "KIM_";

/// Environment variable selecting the active profile.
pub const PROFILE_ENV: &str = "KIM_PROFILE";

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// A typed section rejected one or more values.
    Validation(Vec<(String, String)>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "config load error: {msg}"),
            ConfigError::Validation(details) => {
                write!(f, "config validation errors:")?;
                for (key, message) in details {
                    write!(f, "\n  - {key}: {message}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Layered configuration for the kim manager.
///
/// Resolution order (lowest to highest priority):
/// 1. `kim.yaml`
/// 2. `kim-{profile}.yaml`
/// 3. `.env`, then `.env.{profile}` (never overwrite variables already set)
/// 4. `KIM_*` environment variables
///
/// Environment keys map onto dotted config keys: `__` separates sections and
/// a single `_` becomes `-`, so `KIM_CONTROLLER__REQUEUE_BASE_SECS` sets
/// `controller.requeue-base-secs`.
///
/// Profile is determined by: `KIM_PROFILE` env var > argument > `"dev"`.
#[derive(Debug, Clone)]
pub struct KimConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl KimConfig {
    /// Load configuration from `dir` for the given profile using a custom
    /// secret resolver for `${...}` placeholders.
    pub fn load_from_with_resolver(
        dir: impl AsRef<Path>,
        profile: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let active_profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();
        loader::load_yaml_file(&dir.join("kim.yaml"), &mut values)?;
        loader::load_yaml_file(&dir.join(format!("kim-{active_profile}.yaml")), &mut values)?;

        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        resolve_string_values(&mut values, resolver)?;

        for (env_key, env_val) in std::env::vars() {
            if let Some(key) = env_key_to_config_key(&env_key) {
                values.insert(key, ConfigValue::String(env_val));
            }
        }

        tracing::debug!(profile = %active_profile, keys = values.len(), "configuration loaded");

        Ok(KimConfig {
            values,
            profile: active_profile,
        })
    }

    /// Load configuration from `dir` with the default resolver (env + file).
    pub fn load_from(dir: impl AsRef<Path>, profile: &str) -> Result<Self, ConfigError> {
        Self::load_from_with_resolver(dir, profile, &DefaultSecretResolver)
    }

    /// Load configuration from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(PathBuf::from("."), profile)
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(KimConfig {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config.
    pub fn empty() -> Self {
        KimConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Get a typed value for the given dot-separated key.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a typed value, returning `default` only when the key is missing.
    ///
    /// A present value of the wrong type is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.get(key) {
            Err(ConfigError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    /// Check whether a key exists in the config.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Build a typed section from this config.
    pub fn section<C: ConfigProperties>(&self) -> Result<C, ConfigError> {
        C::from_config(self)
    }
}

/// `KIM_OIDC__ACCESS_TOKEN_TTL` -> `oidc.access-token-ttl`.
fn env_key_to_config_key(env_key: &str) -> Option<String> {
    let rest = env_key.strip_prefix(ENV_PREFIX)?;
    if rest.is_empty() || env_key == PROFILE_ENV {
        return None;
    }
    Some(
        rest.split("__")
            .map(|part| part.to_lowercase().replace('_', "-"))
            .collect::<Vec<_>>()
            .join("."),
    )
}

fn resolve_string_values(
    values: &mut HashMap<String, ConfigValue>,
    resolver: &dyn SecretResolver,
) -> Result<(), ConfigError> {
    for value in values.values_mut() {
        resolve_value(value, resolver)?;
    }
    Ok(())
}

/// Lists and maps are kept whole next to their flattened keys, so
/// placeholders inside them are resolved too.
fn resolve_value(value: &mut ConfigValue, resolver: &dyn SecretResolver) -> Result<(), ConfigError> {
    match value {
        ConfigValue::String(s) if s.contains("${") => {
            *s = secrets::resolve_placeholders(s, resolver)?;
        }
        ConfigValue::List(items) => {
            for item in items {
                resolve_value(item, resolver)?;
            }
        }
        ConfigValue::Map(map) => {
            for item in map.values_mut() {
                resolve_value(item, resolver)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(
            env_key_to_config_key("KIM_CONTROLLER__REQUEUE_BASE_SECS").as_deref(),
            Some("controller.requeue-base-secs")
        );
        assert_eq!(
            env_key_to_config_key("KIM_OIDC__ISSUER").as_deref(),
            Some("oidc.issuer")
        );
        assert_eq!(env_key_to_config_key("PATH"), None);
        assert_eq!(env_key_to_config_key("KIM_PROFILE"), None);
    }

    #[test]
    fn placeholders_inside_lists_are_resolved() {
        struct Fixed;
        impl SecretResolver for Fixed {
            fn resolve(&self, _: &str) -> Result<String, ConfigError> {
                Ok("s3cret".to_string())
            }
        }
        let mut values = HashMap::new();
        loader::load_yaml_str("oidc:\n  clients:\n    - id: web\n      secret: ${WEB}\n", &mut values)
            .unwrap();
        resolve_string_values(&mut values, &Fixed).unwrap();
        let clients = values.get("oidc.clients").unwrap();
        let ConfigValue::List(items) = clients else {
            panic!("expected a list");
        };
        assert_eq!(
            items[0].field("secret"),
            Some(&ConfigValue::String("s3cret".into()))
        );
    }

    #[test]
    fn get_or_rejects_wrong_type() {
        let mut config = KimConfig::empty();
        config.set("controller.workers", ConfigValue::String("many".into()));
        assert!(config.get_or("controller.workers", 4usize).is_err());
        assert_eq!(config.get_or("controller.missing", 4usize).unwrap(), 4);
    }
}
