use std::time::Duration;

use kim_core::{ConfigError, ConfigProperties, KimConfig};

/// `controller.*` configuration section.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Maximum concurrent reconciles per controller.
    pub workers: usize,
    pub requeue_base: Duration,
    pub requeue_max: Duration,
    /// Interval of the periodic full resync.
    pub resync: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            requeue_base: Duration::from_secs(1),
            requeue_max: Duration::from_secs(300),
            resync: Duration::from_secs(300),
        }
    }
}

impl ConfigProperties for ControllerConfig {
    fn prefix() -> &'static str {
        "controller"
    }

    fn from_config(config: &KimConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let workers: usize = config.get_or(&Self::key("workers"), defaults.workers)?;
        let base: u64 = config.get_or(
            &Self::key("requeue-base-secs"),
            defaults.requeue_base.as_secs(),
        )?;
        let max: u64 = config.get_or(
            &Self::key("requeue-max-secs"),
            defaults.requeue_max.as_secs(),
        )?;
        let resync: u64 = config.get_or(&Self::key("resync-secs"), defaults.resync.as_secs())?;

        let mut errors = Vec::new();
        if workers == 0 {
            errors.push((Self::key("workers"), "must be at least 1".to_string()));
        }
        if base == 0 {
            errors.push((Self::key("requeue-base-secs"), "must be at least 1".to_string()));
        }
        if max < base {
            errors.push((
                Self::key("requeue-max-secs"),
                "must not be smaller than requeue-base-secs".to_string(),
            ));
        }
        if resync == 0 {
            errors.push((Self::key("resync-secs"), "must be at least 1".to_string()));
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        Ok(Self {
            workers,
            requeue_base: Duration::from_secs(base),
            requeue_max: Duration::from_secs(max),
            resync: Duration::from_secs(resync),
        })
    }
}
