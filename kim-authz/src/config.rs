use std::time::Duration;

use kim_core::{ConfigError, ConfigProperties, KimConfig};

use crate::cache::DEFAULT_MAX_ENTRIES;

/// `authz.*` configuration section.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(30),
            cache_capacity: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl ConfigProperties for EngineConfig {
    fn prefix() -> &'static str {
        "authz"
    }

    fn from_config(config: &KimConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            cache_enabled: config.get_or(&Self::key("cache-enabled"), defaults.cache_enabled)?,
            cache_ttl: config.get_or(&Self::key("cache-ttl"), defaults.cache_ttl)?,
            cache_capacity: config.get_or(&Self::key("cache-capacity"), defaults.cache_capacity)?,
        })
    }
}
