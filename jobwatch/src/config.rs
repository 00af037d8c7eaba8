//! Configuration for status tracking.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

/// Default record TTL when neither the job type nor the global configuration
/// supplies one: thirty minutes.
pub const DEFAULT_EXPIRY: u64 = 30 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobwatchConfig {
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Tracking policy.
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Tracking policy configuration.
///
/// Read once at process startup and treated as immutable for the process
/// lifetime; runtime mutation of the policy is deliberately not supported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfig {
    /// Record TTL in seconds, overriding [`DEFAULT_EXPIRY`]. A job type's own
    /// [`expiration`](crate::Trackable::expiration) takes precedence over this.
    #[serde(default)]
    pub expiration: Option<u64>,
    /// Track every job type, not only those that opt in.
    #[serde(default)]
    pub all_jobs: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl JobwatchConfig {
    /// Load configuration from files and environment.
    ///
    /// Merges `config/default.toml`, then `config/local.toml`, then
    /// `JOBWATCH_`-prefixed environment variables (`__` separates nesting, so
    /// `JOBWATCH_TRACKER__ALL_JOBS=true` sets `tracker.all_jobs`).
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"))
            .merge(Env::prefixed("JOBWATCH_").split("__"));

        let config: Self = figment.extract()?;
        Ok(config)
    }

    /// Set the global record TTL in seconds.
    #[must_use]
    pub const fn with_expiration(mut self, seconds: u64) -> Self {
        self.tracker.expiration = Some(seconds);
        self
    }

    /// Track every job type regardless of per-type opt-in.
    #[must_use]
    pub const fn with_all_jobs(mut self, all_jobs: bool) -> Self {
        self.tracker.all_jobs = all_jobs;
        self
    }

    /// Set the Redis connection URL.
    #[must_use]
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis.url = url.into();
        self
    }
}
