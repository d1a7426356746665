//! Configuration management.

mod tasks;

pub use tasks::{TaskPoolConfig, TaskSettings};

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for netconv.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Process-wide directory receiving committed export artifacts.
    pub artifact_dir: PathBuf,
    /// Root for scratch areas; the system temp directory when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Bounded runner configuration.
    pub tasks: TaskPoolConfig,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Artifact directory.
    pub artifact_dir: Option<String>,
    /// Scratch directory.
    pub scratch_dir: Option<String>,
    /// Task pool section.
    pub tasks: Option<TaskSettings>,
    /// Observability section.
    pub observability: Option<ObservabilitySettings>,
}

/// `[observability]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// `[observability.logging]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// `[observability.metrics]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Whether the Prometheus recorder is installed.
    pub enabled: Option<bool>,
    /// Listener port.
    pub port: Option<u16>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir().join("netconv"),
            scratch_dir: None,
            tasks: TaskPoolConfig::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl ConversionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file).with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<config dir>/netconv/netconv.toml` (platform specific, e.g.
    /// `~/.config/netconv/netconv.toml`). Falls back to defaults when the
    /// file is missing or unreadable. Env overrides apply in every case.
    #[must_use]
    pub fn load_default() -> Self {
        let env = |key: &str| std::env::var(key).ok();
        let Some(path) = default_config_path() else {
            return Self::default().with_env_overrides(env);
        };
        if !path.exists() {
            return Self::default().with_env_overrides(env);
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default().with_env_overrides(env)
            },
        }
    }

    /// Builds configuration from a parsed config file.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            artifact_dir: file
                .artifact_dir
                .map_or(defaults.artifact_dir, PathBuf::from),
            scratch_dir: file.scratch_dir.map(PathBuf::from),
            tasks: TaskPoolConfig::from_settings(file.tasks.as_ref()),
            observability: file.observability.unwrap_or_default(),
        }
    }

    /// Applies environment overrides read through `env`.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `NETCONV_ARTIFACT_DIR` | Artifact directory |
    /// | `NETCONV_SCRATCH_DIR` | Scratch root |
    /// | `NETCONV_TASKS_*` | See [`TaskPoolConfig::with_env_overrides`] |
    #[must_use]
    pub fn with_env_overrides<E>(mut self, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env("NETCONV_ARTIFACT_DIR").filter(|v| !v.trim().is_empty()) {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("NETCONV_SCRATCH_DIR").filter(|v| !v.trim().is_empty()) {
            self.scratch_dir = Some(PathBuf::from(dir));
        }
        self.tasks = self.tasks.with_env_overrides(env);
        self
    }

    /// Sets the artifact directory.
    #[must_use]
    pub fn with_artifact_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_dir = path.into();
        self
    }

    /// Sets the scratch root.
    #[must_use]
    pub fn with_scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }

    /// Sets the task pool configuration.
    #[must_use]
    pub const fn with_tasks(mut self, tasks: TaskPoolConfig) -> Self {
        self.tasks = tasks;
        self
    }

    /// Scratch root actually used.
    #[must_use]
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "netconv")
        .map(|dirs| dirs.config_dir().join("netconv.toml"))
}
