use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::errors::ConfigError;

/// Longest accepted cache entry lifetime (10 years)
pub const MAX_AGE_HOURS_LIMIT: i64 = 24 * 365 * 10;

/// How `generation_count` evolves when an existing cache entry is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPolicy {
    /// 1 on first write, previous + 1 on every refresh
    #[default]
    Increment,
    /// Always 1, regardless of how many times the plan was regenerated
    Reset,
}

impl GenerationPolicy {
    /// Generation count to store given the value currently in the store
    pub fn next(self, previous: Option<i32>) -> i32 {
        match (self, previous) {
            (GenerationPolicy::Increment, Some(prev)) => prev.saturating_add(1),
            _ => 1,
        }
    }
}

impl FromStr for GenerationPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "increment" => Ok(GenerationPolicy::Increment),
            "reset" => Ok(GenerationPolicy::Reset),
            other => Err(ConfigError::InvalidValue {
                key: "generation_policy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Population run configuration
///
/// The pacing pair (`batch_size`, `delay_between_batches_ms`) is the whole
/// rate-limiting mechanism: pick it offline against the provider's
/// calls-per-minute quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulateConfig {
    /// Symbols processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between consecutive batches in milliseconds
    #[serde(default = "default_delay_between_batches_ms")]
    pub delay_between_batches_ms: u64,

    /// Total fetch attempts per symbol (not additional retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff base: attempt N waits N × base before retrying
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Cache entry lifetime in hours
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,

    /// Ignore freshness and refetch everything selected
    #[serde(default)]
    pub force_refresh: bool,

    /// Record per-symbol failures and keep going instead of aborting
    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    /// Cap on the number of selected symbols
    #[serde(default)]
    pub max_symbols: Option<usize>,

    #[serde(default)]
    pub generation_policy: GenerationPolicy,

    /// Value written to the entry's `source` column
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for PopulateConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            delay_between_batches_ms: default_delay_between_batches_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_age_hours: default_max_age_hours(),
            force_refresh: false,
            continue_on_error: true,
            max_symbols: None,
            generation_policy: GenerationPolicy::default(),
            source: default_source(),
        }
    }
}

impl PopulateConfig {
    /// Defaults overridden by `POPULATE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("POPULATE_BATCH_SIZE")? {
            config.batch_size = v;
        }
        if let Some(v) = env_parse::<u64>("POPULATE_DELAY_MS")? {
            config.delay_between_batches_ms = v;
        }
        if let Some(v) = env_parse::<u32>("POPULATE_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("POPULATE_RETRY_BASE_MS")? {
            config.retry_base_delay_ms = v;
        }
        if let Some(v) = env_parse::<i64>("POPULATE_MAX_AGE_HOURS")? {
            config.max_age_hours = v;
        }
        if let Ok(v) = std::env::var("POPULATE_GENERATION_POLICY") {
            config.generation_policy = v.parse()?;
        }

        Ok(config)
    }

    /// Reject values that would stall or spin the scheduler
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_retries".to_string(),
                value: "0".to_string(),
            });
        }
        if self.max_age_hours <= 0 || self.max_age_hours > MAX_AGE_HOURS_LIMIT {
            return Err(ConfigError::InvalidValue {
                key: "max_age_hours".to_string(),
                value: self.max_age_hours.to_string(),
            });
        }
        Ok(())
    }

    pub fn delay_between_batches(&self) -> Duration {
        Duration::from_millis(self.delay_between_batches_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_age(&self) -> Result<chrono::Duration, ConfigError> {
        chrono::Duration::try_hours(self.max_age_hours).ok_or_else(|| ConfigError::InvalidValue {
            key: "max_age_hours".to_string(),
            value: self.max_age_hours.to_string(),
        })
    }

    /// Upper bound on batch-start rate, used to sanity check pacing in logs
    pub fn calls_per_minute(&self) -> f64 {
        if self.delay_between_batches_ms == 0 {
            return f64::INFINITY;
        }
        self.batch_size as f64 * 60_000.0 / self.delay_between_batches_ms as f64
    }
}

/// Trade plan provider connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, e.g. "https://plans.example.com/api"
    pub base_url: String,

    /// Optional bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("TRADE_PLAN_API_URL")
            .map_err(|_| ConfigError::MissingEnv("TRADE_PLAN_API_URL".to_string()))?;

        Ok(Self {
            base_url,
            api_key: std::env::var("TRADE_PLAN_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout_secs: env_parse("TRADE_PLAN_TIMEOUT_SECS")?.unwrap_or_else(default_timeout),
        })
    }
}

/// PostgreSQL settings for the cache store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL".to_string()))?;

        Ok(Self {
            url,
            pool_size: env_parse("DB_POOL_MAX_SIZE")?.unwrap_or_else(default_pool_size),
        })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

// Default value functions for serde
fn default_batch_size() -> usize {
    1
}

fn default_delay_between_batches_ms() -> u64 {
    4000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_max_age_hours() -> i64 {
    24
}

fn default_true() -> bool {
    true
}

fn default_source() -> String {
    "population-job".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PopulateConfig::default();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.delay_between_batches_ms, 4000);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_base_delay_ms, 1000);
        assert_eq!(config.max_age_hours, 24);
        assert!(!config.force_refresh);
        assert!(config.continue_on_error);
        assert_eq!(config.generation_policy, GenerationPolicy::Increment);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: PopulateConfig = serde_json::from_str(r#"{"batch_size": 3}"#).unwrap();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.delay_between_batches_ms, 4000);
        assert!(config.continue_on_error);
    }

    #[test]
    fn test_default_pacing_stays_under_quota() {
        // 1 call every 4s = 15 calls per minute
        assert_eq!(PopulateConfig::default().calls_per_minute(), 15.0);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = PopulateConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "batch_size"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = PopulateConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_max_age() {
        let config = PopulateConfig {
            max_age_hours: 99_999_999_999,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "max_age_hours"
        ));
        assert!(config.max_age().is_err());

        let config = PopulateConfig {
            max_age_hours: MAX_AGE_HOURS_LIMIT,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.max_age().unwrap(), chrono::Duration::days(3650));

        let config = PopulateConfig {
            max_age_hours: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generation_policy() {
        assert_eq!(GenerationPolicy::Increment.next(None), 1);
        assert_eq!(GenerationPolicy::Increment.next(Some(4)), 5);
        assert_eq!(GenerationPolicy::Reset.next(Some(4)), 1);
        assert_eq!("RESET".parse::<GenerationPolicy>().unwrap(), GenerationPolicy::Reset);
        assert!("sometimes".parse::<GenerationPolicy>().is_err());
    }
}
