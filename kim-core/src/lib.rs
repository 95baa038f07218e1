//! Shared runtime pieces for kim: layered configuration and tracing setup.

pub mod config;
pub mod telemetry;

pub use config::{ConfigError, ConfigProperties, ConfigValue, FromConfigValue, KimConfig};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryGuard};
