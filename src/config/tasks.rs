//! Bounded task pool configuration.

use serde::Deserialize;

const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Configuration for the bounded import/export runner.
///
/// The queue in front of the runner is unbounded unless `max_pending` or
/// `queue_timeout_ms` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPoolConfig {
    /// Maximum concurrently running import/export jobs.
    ///
    /// Default: 4.
    pub max_concurrent: usize,

    /// Maximum queued jobs before submissions are refused (0 = unbounded).
    ///
    /// Default: 0.
    pub max_pending: usize,

    /// Time a job may wait for a worker before it fails (0 = wait forever).
    ///
    /// Default: 0.
    pub queue_timeout_ms: u64,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `[tasks]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskSettings {
    /// Maximum concurrent jobs.
    pub max_concurrent: Option<usize>,
    /// Queue bound.
    pub max_pending: Option<usize>,
    /// Queue timeout in milliseconds.
    pub queue_timeout_ms: Option<u64>,
}

impl TaskPoolConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_pending: 0,
            queue_timeout_ms: 0,
        }
    }

    /// Builds the configuration from a `[tasks]` section.
    #[must_use]
    pub fn from_settings(settings: Option<&TaskSettings>) -> Self {
        let defaults = Self::new();
        let Some(settings) = settings else {
            return defaults;
        };
        Self {
            max_concurrent: settings
                .max_concurrent
                .unwrap_or(defaults.max_concurrent)
                .max(1),
            max_pending: settings.max_pending.unwrap_or(defaults.max_pending),
            queue_timeout_ms: settings
                .queue_timeout_ms
                .unwrap_or(defaults.queue_timeout_ms),
        }
    }

    /// Applies overrides read through `env`.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `NETCONV_TASKS_MAX_CONCURRENT` | Max concurrent jobs | 4 |
    /// | `NETCONV_TASKS_MAX_PENDING` | Queue bound, 0 = unbounded | 0 |
    /// | `NETCONV_TASKS_QUEUE_TIMEOUT_MS` | Queue wait limit, 0 = none | 0 |
    #[must_use]
    pub fn with_env_overrides<E>(mut self, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("NETCONV_TASKS_MAX_CONCURRENT")
            && let Ok(parsed) = v.trim().parse::<usize>()
        {
            self.max_concurrent = parsed.max(1);
        }
        if let Some(v) = env("NETCONV_TASKS_MAX_PENDING")
            && let Ok(parsed) = v.trim().parse::<usize>()
        {
            self.max_pending = parsed;
        }
        if let Some(v) = env("NETCONV_TASKS_QUEUE_TIMEOUT_MS")
            && let Ok(parsed) = v.trim().parse::<u64>()
        {
            self.queue_timeout_ms = parsed;
        }
        self
    }

    /// Sets the maximum concurrent jobs.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the queue bound.
    #[must_use]
    pub const fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = max;
        self
    }

    /// Sets the queue timeout in milliseconds.
    #[must_use]
    pub const fn with_queue_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.queue_timeout_ms = timeout_ms;
        self
    }
}
