//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "netconv=info";
const VERBOSE_FILTER: &str = "netconv=debug";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to pretty output.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Level filter.
    pub filter: EnvFilter,
    /// Optional log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Precedence for the filter: `NETCONV_LOG_FILTER`, `RUST_LOG`, settings,
    /// then the default (`debug` when verbose).
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::from_settings_with_env(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Builds logging configuration reading overrides through `env`.
    #[must_use]
    pub fn from_settings_with_env<E>(settings: Option<&LoggingSettings>, verbose: bool, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let format = env("NETCONV_LOG_FORMAT")
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map(|value| LogFormat::parse(&value))
            .unwrap_or_default();

        let directive = env("NETCONV_LOG_FILTER")
            .or_else(|| env("RUST_LOG"))
            .or_else(|| settings.and_then(|s| s.filter.clone()))
            .unwrap_or_else(|| {
                if verbose {
                    VERBOSE_FILTER.to_string()
                } else {
                    DEFAULT_FILTER.to_string()
                }
            });
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            tracing::warn!(directive = %directive, error = %e, "Invalid log filter, using default");
            EnvFilter::new(DEFAULT_FILTER)
        });

        let file = env("NETCONV_LOG_FILE")
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Self {
            format,
            filter,
            file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Pretty);
    }

    #[test]
    fn test_settings_then_env_precedence() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            filter: Some("netconv=warn".to_string()),
            file: None,
        };

        let config = LoggingConfig::from_settings_with_env(Some(&settings), false, |_| None);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.to_string(), "netconv=warn");

        let config = LoggingConfig::from_settings_with_env(Some(&settings), false, |key| {
            (key == "NETCONV_LOG_FILTER").then(|| "netconv=trace".to_string())
        });
        assert_eq!(config.filter.to_string(), "netconv=trace");
    }

    #[test]
    fn test_verbose_default_filter() {
        let config = LoggingConfig::from_settings_with_env(None, true, |_| None);
        assert_eq!(config.filter.to_string(), VERBOSE_FILTER);
        assert!(config.file.is_none());
    }
}
