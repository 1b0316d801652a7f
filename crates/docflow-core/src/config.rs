//! # Pipeline Configuration
//!
//! Validated configuration for the backpressure pipeline. A
//! [`BackpressureConfig`] can only be obtained through
//! [`BackpressureConfigBuilder::build`] (or [`Default`]), so every instance
//! in circulation satisfies its invariants.
//!
//! ## Environment Variables
//!
//! - `DOCFLOW_MAX_QUEUE_DEPTH` - Maximum queued tasks (default: 100)
//! - `DOCFLOW_MAX_CONCURRENT_TASKS` - Simultaneously executing tasks (default: 10)
//! - `DOCFLOW_CPU_THRESHOLD_PERCENT` - CPU usage above which workers are shed (default: 80.0)
//! - `DOCFLOW_ENABLE_DYNAMIC_SCALING` - Enable CPU-aware worker scaling (default: true)
//! - `DOCFLOW_MIN_WORKERS` - Lower worker bound (default: 1)
//! - `DOCFLOW_MAX_WORKERS` - Upper worker bound (default: available CPU parallelism)
//! - `DOCFLOW_SCALE_COOLDOWN_SECS` - Minimum seconds between scaling decisions (default: 10)
//! - `DOCFLOW_ENQUEUE_TIMEOUT_MS` - Admission timeout per item; unset blocks until space

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// Validated queue depth (1-100,000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct QueueDepth(NonZeroUsize);

impl QueueDepth {
    pub const MAX: usize = 100_000;

    pub fn new(depth: usize) -> Result<Self, ConfigError> {
        let non_zero = NonZeroUsize::new(depth).ok_or_else(|| {
            ConfigError::ValidationError("max_queue_depth must be at least 1".to_string())
        })?;
        if depth > Self::MAX {
            return Err(ConfigError::ValidationError(format!(
                "max_queue_depth must be at most {}",
                Self::MAX
            )));
        }
        Ok(Self(non_zero))
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

impl std::fmt::Display for QueueDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated concurrency limit (1-10,000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ConcurrencyLimit(NonZeroUsize);

impl ConcurrencyLimit {
    pub const MAX: usize = 10_000;

    pub fn new(limit: usize) -> Result<Self, ConfigError> {
        let non_zero = NonZeroUsize::new(limit).ok_or_else(|| {
            ConfigError::ValidationError("max_concurrent_tasks must be at least 1".to_string())
        })?;
        if limit > Self::MAX {
            return Err(ConfigError::ValidationError(format!(
                "max_concurrent_tasks must be at most {}",
                Self::MAX
            )));
        }
        Ok(Self(non_zero))
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

impl std::fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated CPU threshold in percent, within (0.0, 100.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct CpuThreshold(f64);

impl CpuThreshold {
    pub fn new(percent: f64) -> Result<Self, ConfigError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(ConfigError::ValidationError(
                "cpu_threshold_percent must be greater than 0.0 and at most 100.0".to_string(),
            ));
        }
        Ok(Self(percent))
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for CpuThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Number of workers the machine can usefully run in parallel
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Configuration for backpressure, concurrency and worker scaling.
///
/// Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct BackpressureConfig {
    max_queue_depth: QueueDepth,
    max_concurrent_tasks: ConcurrencyLimit,
    cpu_threshold_percent: CpuThreshold,
    enable_dynamic_scaling: bool,
    min_workers: usize,
    max_workers: usize,
    scale_cooldown: Duration,
    enqueue_timeout: Option<Duration>,
}

impl BackpressureConfig {
    /// Start a builder populated with defaults
    #[must_use]
    pub fn builder() -> BackpressureConfigBuilder {
        BackpressureConfigBuilder::new()
    }

    /// Maximum number of tasks held by the queue at any instant
    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth.get()
    }

    /// Maximum number of simultaneously executing work functions
    pub fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks.get()
    }

    /// CPU usage (percent) above which the scaler sheds workers
    pub fn cpu_threshold_percent(&self) -> f64 {
        self.cpu_threshold_percent.get()
    }

    pub fn enable_dynamic_scaling(&self) -> bool {
        self.enable_dynamic_scaling
    }

    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Minimum spacing between two worker-count adjustments
    pub fn scale_cooldown(&self) -> Duration {
        self.scale_cooldown
    }

    /// Admission timeout used for every item of a batch (`None` blocks until space)
    pub fn enqueue_timeout(&self) -> Option<Duration> {
        self.enqueue_timeout
    }
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        let max_workers = default_worker_count();
        Self {
            // SAFETY: These values are within valid ranges
            max_queue_depth: QueueDepth::new(100).expect("default queue depth is valid"),
            max_concurrent_tasks: ConcurrencyLimit::new(10)
                .expect("default concurrency limit is valid"),
            cpu_threshold_percent: CpuThreshold::new(80.0).expect("default threshold is valid"),
            enable_dynamic_scaling: true,
            min_workers: 1,
            max_workers,
            scale_cooldown: Duration::from_secs(10),
            enqueue_timeout: None,
        }
    }
}

/// Builder for [`BackpressureConfig`] with environment variable support
#[derive(Debug, Clone)]
pub struct BackpressureConfigBuilder {
    max_queue_depth: usize,
    max_concurrent_tasks: usize,
    cpu_threshold_percent: f64,
    enable_dynamic_scaling: bool,
    min_workers: usize,
    max_workers: usize,
    scale_cooldown: Duration,
    enqueue_timeout: Option<Duration>,
}

impl Default for BackpressureConfigBuilder {
    fn default() -> Self {
        Self {
            max_queue_depth: 100,
            max_concurrent_tasks: 10,
            cpu_threshold_percent: 80.0,
            enable_dynamic_scaling: true,
            min_workers: 1,
            max_workers: default_worker_count(),
            scale_cooldown: Duration::from_secs(10),
            enqueue_timeout: None,
        }
    }
}

impl BackpressureConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if any variable has a malformed value.
    /// Range validation is deferred to [`build`](Self::build).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(depth) = get_env_usize("DOCFLOW_MAX_QUEUE_DEPTH")? {
            builder = builder.max_queue_depth(depth);
        }
        if let Some(limit) = get_env_usize("DOCFLOW_MAX_CONCURRENT_TASKS")? {
            builder = builder.max_concurrent_tasks(limit);
        }
        if let Some(threshold) = get_env_f64("DOCFLOW_CPU_THRESHOLD_PERCENT")? {
            builder = builder.cpu_threshold_percent(threshold);
        }
        if let Some(enabled) = get_env_bool("DOCFLOW_ENABLE_DYNAMIC_SCALING")? {
            builder = builder.enable_dynamic_scaling(enabled);
        }
        if let Some(min) = get_env_usize("DOCFLOW_MIN_WORKERS")? {
            builder = builder.min_workers(min);
        }
        if let Some(max) = get_env_usize("DOCFLOW_MAX_WORKERS")? {
            builder = builder.max_workers(max);
        }
        if let Some(secs) = get_env_u64("DOCFLOW_SCALE_COOLDOWN_SECS")? {
            builder = builder.scale_cooldown(Duration::from_secs(secs));
        }
        if let Some(ms) = get_env_u64("DOCFLOW_ENQUEUE_TIMEOUT_MS")? {
            builder = builder.enqueue_timeout(Some(Duration::from_millis(ms)));
        }

        Ok(builder)
    }

    #[must_use]
    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    #[must_use]
    pub fn max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.max_concurrent_tasks = limit;
        self
    }

    #[must_use]
    pub fn cpu_threshold_percent(mut self, percent: f64) -> Self {
        self.cpu_threshold_percent = percent;
        self
    }

    #[must_use]
    pub fn enable_dynamic_scaling(mut self, enabled: bool) -> Self {
        self.enable_dynamic_scaling = enabled;
        self
    }

    #[must_use]
    pub fn min_workers(mut self, min: usize) -> Self {
        self.min_workers = min;
        self
    }

    #[must_use]
    pub fn max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    /// Set both worker bounds at once
    #[must_use]
    pub fn workers(self, min: usize, max: usize) -> Self {
        self.min_workers(min).max_workers(max)
    }

    #[must_use]
    pub fn scale_cooldown(mut self, cooldown: Duration) -> Self {
        self.scale_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn enqueue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Validate configuration and build [`BackpressureConfig`]
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first violated invariant.
    pub fn build(self) -> Result<BackpressureConfig, ConfigError> {
        let max_queue_depth = QueueDepth::new(self.max_queue_depth)?;
        let max_concurrent_tasks = ConcurrencyLimit::new(self.max_concurrent_tasks)?;
        let cpu_threshold_percent = CpuThreshold::new(self.cpu_threshold_percent)?;

        if self.min_workers == 0 {
            return Err(ConfigError::ValidationError(
                "min_workers must be greater than 0".to_string(),
            ));
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::ValidationError(format!(
                "min_workers ({}) must be <= max_workers ({})",
                self.min_workers, self.max_workers
            )));
        }

        Ok(BackpressureConfig {
            max_queue_depth,
            max_concurrent_tasks,
            cpu_threshold_percent,
            enable_dynamic_scaling: self.enable_dynamic_scaling,
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            scale_cooldown: self.scale_cooldown,
            enqueue_timeout: self.enqueue_timeout,
        })
    }
}

// Environment variable helper functions

fn get_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!(
                    "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                ),
            }),
        },
        Err(_) => Ok(None),
    }
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_f64(key: &str) -> Result<Option<f64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<f64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid f64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
