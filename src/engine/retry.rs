//! Fetch executor: bounded attempts with linear backoff.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::FetchError;
use super::pacing::Sleeper;
use crate::config::PopulateConfig;
use crate::datasource::{ProviderError, TradePlan, TradePlanProvider};

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Sum of every backoff a fully failing symbol sleeps through
    pub fn worst_case_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.backoff(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl From<&PopulateConfig> for RetryPolicy {
    fn from(config: &PopulateConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }
}

/// Calls the provider until it succeeds or the attempt budget is spent
pub struct FetchExecutor {
    provider: Arc<dyn TradePlanProvider>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl FetchExecutor {
    pub fn new(
        provider: Arc<dyn TradePlanProvider>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            sleeper,
            policy,
        }
    }

    /// Every error kind is retried; the last one is reported
    pub async fn fetch(&self, symbol: &str) -> Result<TradePlan, FetchError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_error = ProviderError::Other("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            debug!(
                symbol = %symbol,
                provider = self.provider.name(),
                attempt,
                max_attempts,
                "Fetching trade plan"
            );

            match self.provider.generate(symbol).await {
                Ok(plan) => return Ok(plan),
                Err(e) => {
                    if attempt < max_attempts {
                        let delay = self.policy.backoff(attempt);
                        warn!(
                            "Trade plan fetch for {} failed (attempt {}/{}): {}. Retrying in {}ms",
                            symbol,
                            attempt,
                            max_attempts,
                            e,
                            delay.as_millis()
                        );
                        self.sleeper.sleep(delay).await;
                    } else {
                        warn!(
                            "Trade plan fetch for {} failed (attempt {}/{}): {}. Giving up",
                            symbol, attempt, max_attempts, e
                        );
                    }
                    last_error = e;
                }
            }
        }

        Err(FetchError {
            symbol: symbol.to_string(),
            attempts: max_attempts,
            source: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSleeper, ScriptedProvider};

    fn executor(
        provider: &Arc<ScriptedProvider>,
        sleeper: &Arc<RecordingSleeper>,
        max_attempts: u32,
    ) -> FetchExecutor {
        FetchExecutor::new(
            provider.clone(),
            sleeper.clone(),
            RetryPolicy::new(max_attempts, Duration::from_millis(1000)),
        )
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_millis(250));
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(3), Duration::from_millis(750));
        assert_eq!(policy.worst_case_backoff(), Duration::from_millis(1500));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let provider = Arc::new(ScriptedProvider::new());
        let sleeper = Arc::new(RecordingSleeper::new());

        let plan = executor(&provider, &sleeper, 2).fetch("AAPL").await.unwrap();

        assert_eq!(plan.symbol, "AAPL");
        assert_eq!(provider.calls("AAPL"), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_after_backoff() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.fail_times("MSFT", 1, ProviderError::Network("reset".to_string()));
        let sleeper = Arc::new(RecordingSleeper::new());

        let plan = executor(&provider, &sleeper, 3).fetch("MSFT").await.unwrap();

        assert_eq!(plan.symbol, "MSFT");
        assert_eq!(provider.calls("MSFT"), 2);
        assert_eq!(sleeper.recorded(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn test_persistent_failure_uses_exact_attempt_budget() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.always_fail(
            "ZZZZ",
            ProviderError::SymbolNotFound {
                symbol: "ZZZZ".to_string(),
            },
        );
        let sleeper = Arc::new(RecordingSleeper::new());

        let err = executor(&provider, &sleeper, 3).fetch("ZZZZ").await.unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(provider.calls("ZZZZ"), 3);
        assert!(matches!(err.source, ProviderError::SymbolNotFound { .. }));
        // No sleep after the final attempt
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }
}
