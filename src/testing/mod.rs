//! Test doubles for the population engine
//!
//! - `ScriptedProvider` - provider whose per-symbol failures are scripted up front
//! - `RecordingSleeper` - sleeper that records requested delays without waiting
//! - `catalog_of` / `cache_entry` - fixture builders

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::catalog::{CatalogProvider, StaticCatalog};
use crate::database::models::TradePlanCacheEntry;
use crate::datasource::{ProviderError, TradePlan, TradePlanProvider};
use crate::engine::Sleeper;

#[derive(Debug, Clone)]
struct Script {
    /// `None` fails forever
    failures_left: Option<u32>,
    error: ProviderError,
}

/// Provider returning a canned plan unless a failure is scripted for the symbol
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, u32>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `times` calls for `symbol`, then succeed
    pub fn fail_times(&self, symbol: &str, times: u32, error: ProviderError) {
        self.scripts.lock().insert(
            symbol.to_string(),
            Script {
                failures_left: Some(times),
                error,
            },
        );
    }

    pub fn always_fail(&self, symbol: &str, error: ProviderError) {
        self.scripts.lock().insert(
            symbol.to_string(),
            Script {
                failures_left: None,
                error,
            },
        );
    }

    pub fn calls(&self, symbol: &str) -> u32 {
        self.calls.lock().get(symbol).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// Highest number of concurrent `generate` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    fn scripted_failure(&self, symbol: &str) -> Option<ProviderError> {
        let mut scripts = self.scripts.lock();
        let script = scripts.get_mut(symbol)?;
        match script.failures_left {
            None => Some(script.error.clone()),
            Some(0) => None,
            Some(ref mut left) => {
                *left -= 1;
                Some(script.error.clone())
            }
        }
    }
}

#[async_trait]
impl TradePlanProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, symbol: &str) -> Result<TradePlan, ProviderError> {
        *self.calls.lock().entry(symbol.to_string()).or_insert(0) += 1;

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::AcqRel);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self.scripted_failure(symbol);

        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        match failure {
            Some(error) => Err(error),
            None => Ok(TradePlan::new(
                symbol,
                serde_json::json!({
                    "bias": "long",
                    "timeframe": "swing",
                    "entry": 100.0,
                    "stopLoss": 95.0,
                    "target": 110.0,
                    "currentPrice": 101.5
                }),
            )),
        }
    }
}

/// Sleeper that returns immediately and remembers what it was asked
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    recorded: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.recorded.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.recorded.lock().push(duration);
    }
}

/// Top `n` symbols of the built-in catalog
pub fn catalog_of(n: usize) -> StaticCatalog {
    let builtin = StaticCatalog::builtin();
    StaticCatalog::from_entries(builtin.entries().iter().take(n).cloned().collect())
}

/// Stored cache entry for seeding a store
pub fn cache_entry(symbol: &str, expires_at: DateTime<Utc>) -> TradePlanCacheEntry {
    let now = Utc::now();
    TradePlanCacheEntry {
        symbol: symbol.to_string(),
        trade_plan: serde_json::json!({"bias": "long"}),
        summary: format!("{}: long bias", symbol),
        description: format!("Trade plan for {} with a long bias.", symbol),
        reference_price: None,
        reference_price_updated_at: None,
        priority: 0,
        is_active: true,
        expires_at,
        generation_count: 1,
        last_accessed_at: None,
        source: "seed".to_string(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_run_out() {
        let provider = ScriptedProvider::new();
        provider.fail_times("AAPL", 1, ProviderError::Network("reset".to_string()));

        assert!(provider.generate("AAPL").await.is_err());
        assert!(provider.generate("AAPL").await.is_ok());
        assert_eq!(provider.calls("AAPL"), 2);
        assert_eq!(provider.total_calls(), 2);
    }

    #[test]
    fn test_catalog_of_takes_top_symbols() {
        let catalog = catalog_of(3);
        assert_eq!(catalog.all_symbols(), vec!["AAPL", "MSFT", "NVDA"]);
    }
}
