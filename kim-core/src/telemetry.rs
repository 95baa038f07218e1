//! Tracing initialisation for the kim manager.
//!
//! Console output goes through `tracing-subscriber` (pretty or JSON). With the
//! `otlp` feature and an `telemetry.otlp-endpoint` configured, spans are also
//! exported over OTLP/HTTP.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{ConfigError, ConfigProperties, KimConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// `telemetry.*` configuration section.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name reported to the tracing backend.
    pub service_name: String,
    /// Default filter directive when `RUST_LOG` is unset.
    pub filter: String,
    pub log_format: LogFormat,
    /// OTLP/HTTP endpoint; export is disabled when unset.
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "kim".to_string(),
            filter: "info".to_string(),
            log_format: LogFormat::Pretty,
            otlp_endpoint: None,
        }
    }
}

impl ConfigProperties for TelemetryConfig {
    fn prefix() -> &'static str {
        "telemetry"
    }

    fn from_config(config: &KimConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let format: String = config.get_or(&Self::key("log-format"), "pretty".to_string())?;
        let log_format = format.parse().map_err(|message| {
            ConfigError::Validation(vec![(Self::key("log-format"), message)])
        })?;
        Ok(Self {
            service_name: config.get_or(&Self::key("service-name"), defaults.service_name)?,
            filter: config.get_or(&Self::key("filter"), defaults.filter)?,
            log_format,
            otlp_endpoint: config.get_or(&Self::key("otlp-endpoint"), None)?,
        })
    }
}

/// Install the global subscriber.
///
/// Calling this more than once keeps the first subscriber. The returned guard
/// flushes exported spans when dropped.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    #[cfg(feature = "otlp")]
    let provider = otlp::build_provider(config);

    let registry = Registry::default().with(env_filter);

    #[cfg(feature = "otlp")]
    let registry = {
        use opentelemetry::trace::TracerProvider;
        registry.with(
            provider
                .as_ref()
                .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("kim"))),
        )
    };

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "global subscriber already installed");
    }

    TelemetryGuard {
        #[cfg(feature = "otlp")]
        provider,
    }
}

/// Flushes and shuts down span export on drop.
pub struct TelemetryGuard {
    #[cfg(feature = "otlp")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otlp")]
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to shut down OpenTelemetry tracer: {e}");
            }
        }
    }
}

#[cfg(feature = "otlp")]
mod otlp {
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    use super::TelemetryConfig;

    pub(super) fn build_provider(config: &TelemetryConfig) -> Option<SdkTracerProvider> {
        use opentelemetry_otlp::WithExportConfig;

        let endpoint = config.otlp_endpoint.as_ref()?;
        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
        {
            Ok(exporter) => exporter,
            Err(e) => {
                eprintln!("OTLP exporter disabled: {e}");
                return None;
            }
        };
        let resource = Resource::builder()
            .with_attributes([opentelemetry::KeyValue::new(
                opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
                config.service_name.clone(),
            )])
            .build();
        Some(
            SdkTracerProvider::builder()
                .with_resource(resource)
                .with_batch_exporter(exporter)
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_section_with_defaults() {
        let config = KimConfig::from_yaml_str("telemetry:\n  log-format: json\n", "test").unwrap();
        let telemetry: TelemetryConfig = config.section().unwrap();
        assert_eq!(telemetry.log_format, LogFormat::Json);
        assert_eq!(telemetry.filter, "info");
        assert!(telemetry.otlp_endpoint.is_none());
    }

    #[test]
    fn rejects_unknown_format() {
        let config = KimConfig::from_yaml_str("telemetry:\n  log-format: xml\n", "test").unwrap();
        assert!(matches!(
            config.section::<TelemetryConfig>(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn init_twice_does_not_panic() {
        let config = TelemetryConfig::default();
        let _first = init_tracing(&config);
        let _second = init_tracing(&config);
    }
}
