//! Runtime configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default idle timeout of a legacy queue worker
pub const DEFAULT_LEGACY_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle timeout of a pool worker
pub const DEFAULT_POOL_WORKER_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on pool workers
pub const DEFAULT_MAX_WORKERS: usize = 500;

/// Configuration of a legacy work queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyConfig {
    /// How long an idle worker waits for new items before exiting
    pub idle_timeout: Duration,
    /// Stack size of worker threads (None = platform default)
    pub stack_size: Option<usize>,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_LEGACY_IDLE_TIMEOUT,
            stack_size: None,
        }
    }
}

impl LegacyConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the worker stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// Configuration of an object-oriented thread pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Floor of worker threads kept alive while idle
    pub min_workers: usize,
    /// Ceiling of worker threads
    pub max_workers: usize,
    /// How long an idle worker waits before it may retire
    pub worker_timeout: Duration,
    /// Stack size of worker threads (None = platform default)
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 0,
            max_workers: DEFAULT_MAX_WORKERS,
            worker_timeout: DEFAULT_POOL_WORKER_TIMEOUT,
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of workers
    pub fn with_min_workers(mut self, min: usize) -> Self {
        self.min_workers = min;
        self.max_workers = self.max_workers.max(min);
        self
    }

    /// Set the maximum number of workers (at least 1)
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self.min_workers = self.min_workers.min(self.max_workers);
        self
    }

    /// Set the idle worker timeout
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Set the worker stack size
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// Configuration of a timer queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Name given to the dispatcher thread
    pub thread_name: String,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            thread_name: "taskloom-timer".to_string(),
        }
    }
}

impl TimerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dispatcher thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// Aggregated configuration for every component
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Legacy work queue
    pub legacy: LegacyConfig,
    /// Thread pools
    pub pool: PoolConfig,
    /// Timer queues
    pub timer: TimerConfig,
}

// On-disk form: durations are plain milliseconds.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    legacy: RawLegacy,
    pool: RawPool,
    timer: RawTimer,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
struct RawLegacy {
    #[serde(skip_serializing_if = "Option::is_none")]
    idle_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
struct RawPool {
    #[serde(skip_serializing_if = "Option::is_none")]
    min_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
struct RawTimer {
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_name: Option<String>,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl From<&RuntimeConfig> for RawConfig {
    fn from(config: &RuntimeConfig) -> Self {
        RawConfig {
            legacy: RawLegacy {
                idle_timeout_ms: Some(duration_ms(config.legacy.idle_timeout)),
                stack_size: config.legacy.stack_size,
            },
            pool: RawPool {
                min_workers: Some(config.pool.min_workers),
                max_workers: Some(config.pool.max_workers),
                worker_timeout_ms: Some(duration_ms(config.pool.worker_timeout)),
                stack_size: config.pool.stack_size,
            },
            timer: RawTimer {
                thread_name: Some(config.timer.thread_name.clone()),
            },
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// ```toml
    /// [legacy]
    /// idle_timeout_ms = 30000
    ///
    /// [pool]
    /// min_workers = 2
    /// max_workers = 16
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        let mut config = Self::default();

        if let Some(ms) = raw.legacy.idle_timeout_ms {
            config.legacy.idle_timeout = Duration::from_millis(ms);
        }
        config.legacy.stack_size = raw.legacy.stack_size;

        if let Some(max) = raw.pool.max_workers {
            if max == 0 {
                return Err(Error::Config("pool.max_workers must be at least 1".into()));
            }
            config.pool = config.pool.with_max_workers(max);
        }
        if let Some(min) = raw.pool.min_workers {
            if min > config.pool.max_workers {
                return Err(Error::Config(format!(
                    "pool.min_workers ({}) exceeds pool.max_workers ({})",
                    min, config.pool.max_workers
                )));
            }
            config.pool = config.pool.with_min_workers(min);
        }
        if let Some(ms) = raw.pool.worker_timeout_ms {
            config.pool.worker_timeout = Duration::from_millis(ms);
        }
        config.pool.stack_size = raw.pool.stack_size;

        if let Some(name) = raw.timer.thread_name {
            config.timer.thread_name = name;
        }

        Ok(config)
    }

    /// Render as a TOML document that [`RuntimeConfig::from_toml_str`] accepts
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(&RawConfig::from(self)).map_err(|e| Error::Config(e.to_string()))
    }
}
