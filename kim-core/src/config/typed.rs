use super::{ConfigError, KimConfig};

/// A strongly-typed configuration section read from a [`KimConfig`].
///
/// ```ignore
/// impl ConfigProperties for ControllerConfig {
///     fn prefix() -> &'static str { "controller" }
///
///     fn from_config(config: &KimConfig) -> Result<Self, ConfigError> {
///         Ok(Self { workers: config.get_or("controller.workers", 4)? })
///     }
/// }
///
/// let controller: ControllerConfig = config.section()?;
/// ```
pub trait ConfigProperties: Sized {
    /// The configuration key prefix (e.g., `"controller"`).
    fn prefix() -> &'static str;

    /// Construct the section, applying defaults for absent keys.
    fn from_config(config: &KimConfig) -> Result<Self, ConfigError>;

    /// Absolute key for a property of this section.
    fn key(property: &str) -> String {
        format!("{}.{property}", Self::prefix())
    }
}
