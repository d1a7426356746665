//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_METRICS_PORT: u16 = 9090;

/// Histogram buckets (seconds) for conversion windows; imports of large
/// cases run for minutes.
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::from_settings_with_env(settings, |key| std::env::var(key).ok())
    }

    /// Builds metrics configuration reading overrides through `env`.
    #[must_use]
    pub fn from_settings_with_env<E>(settings: Option<&MetricsSettings>, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let port = settings
            .and_then(|config| config.port)
            .unwrap_or(DEFAULT_METRICS_PORT);

        let mut config = Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        };

        if let Some(enabled) = env("NETCONV_METRICS_ENABLED").map(|v| parse_bool(&v)) {
            config.enabled = enabled;
        }
        if let Some(port) = env("NETCONV_METRICS_PORT").and_then(|v| v.trim().parse::<u16>().ok())
        {
            config.listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        }

        config
    }
}

/// Metrics handle for rendering the current snapshot.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus metrics recorder, optionally with an HTTP listener.
///
/// The listener needs a running tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the exporter
/// cannot be built.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_buckets".to_string(),
            cause: e.to_string(),
        })?;

    let prometheus = if expose {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::OperationFailed {
            operation: "metrics_listener".to_string(),
            cause: e.to_string(),
        })?;
        let (recorder, exporter) = {
            let _guard = runtime.enter();
            builder
                .with_http_listener(config.listen_addr)
                .build()
                .map_err(|e| Error::OperationFailed {
                    operation: "metrics_exporter_build".to_string(),
                    cause: e.to_string(),
                })?
        };
        let handle = recorder.handle();
        set_global_recorder(recorder)?;
        runtime.spawn(exporter);
        tracing::info!(addr = %config.listen_addr, "Metrics listener started");
        handle
    } else {
        let recorder = builder.build_recorder();
        let handle = recorder.handle();
        set_global_recorder(recorder)?;
        handle
    };

    Ok(Some(MetricsHandle { prometheus }))
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_metrics_disabled_by_default() {
        let config = MetricsConfig::from_settings_with_env(None, |_| None);
        assert!(!config.enabled);
        assert_eq!(config.listen_addr.port(), DEFAULT_METRICS_PORT);
        assert!(install_prometheus(&config, false).unwrap().is_none());
    }

    #[test]
    fn test_env_overrides_settings() {
        let settings = MetricsSettings {
            enabled: Some(false),
            port: Some(9100),
        };
        let env: HashMap<&str, &str> = [
            ("NETCONV_METRICS_ENABLED", "yes"),
            ("NETCONV_METRICS_PORT", "9200"),
        ]
        .into_iter()
        .collect();

        let config = MetricsConfig::from_settings_with_env(Some(&settings), |key| {
            env.get(key).map(ToString::to_string)
        });
        assert!(config.enabled);
        assert_eq!(config.listen_addr.port(), 9200);
    }

    #[test]
    fn test_local_recorder_renders_conversion_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("conversion.import", "format" => "JSON").increment(1);
        });

        let rendered = handle.render();
        assert!(rendered.contains("conversion_import"));
    }
}
