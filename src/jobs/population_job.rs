use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::{select_targets, CatalogProvider, TargetSelection};
use crate::config::PopulateConfig;
use crate::database::models::TradePlanCacheEntry;
use crate::database::repositories::{AnalyticsRepository, TradePlanRepository};
use crate::datasource::TradePlanProvider;
use crate::engine::{
    CacheWriter, EngineError, FetchExecutor, Freshness, FreshnessChecker, RetryPolicy, Sleeper,
    SymbolError, TokioSleeper,
};
use crate::metrics::{ProgressObserver, ProgressReporter, ProgressSnapshot, SymbolOutcome};

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every selected symbol reached a terminal state
    Completed,
    /// Stopped after `symbol` failed with `continue_on_error` off
    Aborted { symbol: String },
    /// Cancellation requested before all batches started
    Cancelled,
}

/// Final report of a population run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub snapshot: ProgressSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// 0 only for a completed run with no failed symbols
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed if self.snapshot.failed == 0 => 0,
            _ => 1,
        }
    }

    /// Symbols never processed
    pub fn remaining(&self) -> usize {
        self.snapshot.remaining()
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.snapshot;
        let outcome = match &self.status {
            RunStatus::Completed => "completed".to_string(),
            RunStatus::Aborted { symbol } => format!("aborted after {} failed", symbol),
            RunStatus::Cancelled => "cancelled".to_string(),
        };

        writeln!(f, "Population run {} {}", self.run_id, outcome)?;
        writeln!(f, "  Total:      {}", s.total)?;
        writeln!(f, "  Successful: {}", s.successful)?;
        writeln!(f, "  Skipped:    {}", s.skipped)?;
        writeln!(f, "  Failed:     {}", s.failed)?;
        if self.remaining() > 0 {
            writeln!(f, "  Remaining:  {}", self.remaining())?;
        }
        write!(f, "  Elapsed:    {:.1}s", s.time_elapsed().as_secs_f64())?;

        if !s.errors.is_empty() {
            write!(f, "\nFailures:")?;
            for failure in &s.errors {
                write!(f, "\n  {}: {}", failure.symbol, failure.message)?;
            }
        }
        Ok(())
    }
}

/// Freshness check, fetch, and write for one symbol
struct SymbolPipeline {
    freshness: FreshnessChecker,
    fetcher: FetchExecutor,
    writer: CacheWriter,
    force_refresh: bool,
}

impl SymbolPipeline {
    async fn process(&self, symbol: String) -> (String, Result<SymbolOutcome, SymbolError>) {
        let freshness = self.freshness.check(&symbol, self.force_refresh).await;
        if let Freshness::Fresh { expires_at } = freshness {
            debug!(symbol = %symbol, %expires_at, "Cache entry fresh, skipping");
            return (symbol, Ok(SymbolOutcome::Skipped));
        }

        let result = self
            .fetch_and_write(&symbol)
            .await
            .map(|_| SymbolOutcome::Written);
        (symbol, result)
    }

    async fn fetch_and_write(&self, symbol: &str) -> Result<TradePlanCacheEntry, SymbolError> {
        let plan = self.fetcher.fetch(symbol).await?;
        Ok(self.writer.write(plan).await?)
    }
}

/// Holds the in-progress flag; clears it on drop, including when a run panics
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Populates and refreshes the trade plan cache in paced batches
///
/// Symbols in a batch run concurrently; batches are separated by the
/// configured delay. Per-symbol failures are recorded and never escape
/// `run`, which only errors on invalid configuration.
pub struct CachePopulationJob {
    catalog: Arc<dyn CatalogProvider>,
    trade_plans: Arc<dyn TradePlanRepository>,
    analytics: Arc<dyn AnalyticsRepository>,
    provider: Arc<dyn TradePlanProvider>,
    sleeper: Arc<dyn Sleeper>,
    config: PopulateConfig,
    observers: Vec<Arc<dyn ProgressObserver>>,
    running: AtomicBool,
}

impl CachePopulationJob {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        trade_plans: Arc<dyn TradePlanRepository>,
        analytics: Arc<dyn AnalyticsRepository>,
        provider: Arc<dyn TradePlanProvider>,
        config: PopulateConfig,
    ) -> Self {
        Self {
            catalog,
            trade_plans,
            analytics,
            provider,
            sleeper: Arc::new(TokioSleeper),
            config,
            observers: Vec::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Replace the sleeper used for backoff and batch delays
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Resolve `selection` against the catalog and populate it
    pub async fn run(
        &self,
        selection: &TargetSelection,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        let pipeline = self.pipeline()?;
        let targets = select_targets(self.catalog.as_ref(), selection, self.config.max_symbols)?;

        info!(selection = %selection.describe(), count = targets.len(), "Selected symbols");

        Ok(self.execute_instrumented(pipeline, targets, cancel).await)
    }

    /// Populate an already resolved symbol list
    pub async fn run_targets(
        &self,
        targets: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        let pipeline = self.pipeline()?;
        Ok(self.execute_instrumented(pipeline, targets, cancel).await)
    }

    fn pipeline(&self) -> Result<SymbolPipeline, EngineError> {
        self.config.validate()?;

        Ok(SymbolPipeline {
            freshness: FreshnessChecker::new(Arc::clone(&self.trade_plans)),
            fetcher: FetchExecutor::new(
                Arc::clone(&self.provider),
                Arc::clone(&self.sleeper),
                RetryPolicy::from(&self.config),
            ),
            writer: CacheWriter::new(
                Arc::clone(&self.trade_plans),
                Arc::clone(&self.analytics),
                Arc::clone(&self.catalog),
                &self.config,
            )?,
            force_refresh: self.config.force_refresh,
        })
    }

    async fn execute_instrumented(
        &self,
        pipeline: SymbolPipeline,
        targets: Vec<String>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("population_run", %run_id);
        self.execute(run_id, pipeline, targets, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        pipeline: SymbolPipeline,
        targets: Vec<String>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let started_at = Utc::now();
        let batch_size = self.config.batch_size.max(1);
        let delay = self.config.delay_between_batches();
        let batch_count = targets.len().div_ceil(batch_size);

        info!(
            total = targets.len(),
            batch_size,
            batches = batch_count,
            delay_ms = self.config.delay_between_batches_ms,
            calls_per_minute = self.config.calls_per_minute(),
            force_refresh = self.config.force_refresh,
            retry_budget_ms = RetryPolicy::from(&self.config).worst_case_backoff().as_millis() as u64,
            "Starting cache population"
        );

        let mut reporter = ProgressReporter::new(targets.len()).with_observers(self.observers.clone());
        let mut status = RunStatus::Completed;

        for (index, batch) in targets.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            if index > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        status = RunStatus::Cancelled;
                        break;
                    }
                    _ = self.sleeper.sleep(delay) => {}
                }
            }

            debug!(batch = index + 1, batches = batch_count, symbols = ?batch, "Processing batch");

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .map(|symbol| pipeline.process(symbol.clone()))
                .collect();

            let mut first_failure: Option<String> = None;
            while let Some((symbol, result)) = in_flight.next().await {
                match result {
                    Ok(SymbolOutcome::Skipped) => {
                        reporter.record_skipped(&symbol);
                    }
                    Ok(_) => {
                        info!(symbol = %symbol, "✅ Trade plan cached");
                        reporter.record_written(&symbol);
                    }
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "❌ Symbol failed");
                        reporter.record_failed(&symbol, e.to_string());
                        if first_failure.is_none() {
                            first_failure = Some(symbol);
                        }
                    }
                }
            }

            if let Some(symbol) = first_failure {
                if !self.config.continue_on_error {
                    warn!(symbol = %symbol, "Aborting run, continue_on_error is disabled");
                    status = RunStatus::Aborted { symbol };
                    break;
                }
            }
        }

        let summary = RunSummary {
            run_id,
            status,
            snapshot: reporter.snapshot(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            status = ?summary.status,
            successful = summary.snapshot.successful,
            skipped = summary.snapshot.skipped,
            failed = summary.snapshot.failed,
            remaining = summary.remaining(),
            elapsed_ms = summary.snapshot.time_elapsed_ms,
            "Cache population finished"
        );

        summary
    }

    /// Register this job with the scheduler
    ///
    /// A tick that fires while the previous run is still going is skipped.
    pub async fn register(
        self: Arc<Self>,
        scheduler: &JobScheduler,
        schedule: &str,
        selection: TargetSelection,
        shutdown: CancellationToken,
    ) -> Result<(), EngineError> {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let this = Arc::clone(&self);
            let selection = selection.clone();
            let shutdown = shutdown.clone();

            Box::pin(async move {
                let Some(_guard) = RunGuard::acquire(&this.running) else {
                    warn!("Previous population run still in progress, skipping tick");
                    return;
                };

                match this.run(&selection, &shutdown).await {
                    Ok(summary) if summary.is_success() => {
                        debug!("Scheduled population run completed successfully");
                    }
                    Ok(summary) => {
                        warn!("Scheduled population run finished with problems:\n{}", summary);
                    }
                    Err(e) => {
                        error!("Scheduled population run failed: {}", e);
                    }
                }
            })
        })
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?;

        info!("✅ Cache population job registered");
        info!("   Schedule: {}", schedule);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::database::InMemoryStore;
    use crate::datasource::ProviderError;
    use crate::engine::ConfigError;
    use crate::metrics::ChannelObserver;
    use crate::testing::{cache_entry, catalog_of, RecordingSleeper, ScriptedProvider};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    struct Harness {
        store: InMemoryStore,
        provider: Arc<ScriptedProvider>,
        sleeper: Arc<RecordingSleeper>,
        catalog: Arc<StaticCatalog>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_provider(ScriptedProvider::new())
        }

        fn with_provider(provider: ScriptedProvider) -> Self {
            Self {
                store: InMemoryStore::new(),
                provider: Arc::new(provider),
                sleeper: Arc::new(RecordingSleeper::new()),
                catalog: Arc::new(catalog_of(25)),
            }
        }

        fn job(&self, config: PopulateConfig) -> CachePopulationJob {
            CachePopulationJob::new(
                self.catalog.clone(),
                Arc::new(self.store.clone()),
                Arc::new(self.store.clone()),
                self.provider.clone(),
                config,
            )
            .with_sleeper(self.sleeper.clone())
        }
    }

    fn config() -> PopulateConfig {
        PopulateConfig {
            delay_between_batches_ms: 100,
            retry_base_delay_ms: 10,
            ..Default::default()
        }
    }

    fn symbols(list: &[&str]) -> TargetSelection {
        TargetSelection::Symbols(list.iter().map(|s| s.to_string()).collect())
    }

    fn not_found(symbol: &str) -> ProviderError {
        ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        }
    }

    fn assert_accounting(summary: &RunSummary) {
        let s = &summary.snapshot;
        assert_eq!(s.successful + s.failed + s.skipped, s.completed);
        assert!(s.completed <= s.total);
    }

    #[tokio::test]
    async fn test_fresh_entry_is_skipped_without_fetch() {
        let harness = Harness::new();
        harness
            .store
            .insert_entry(cache_entry("AAPL", Utc::now() + ChronoDuration::hours(1)));

        let summary = harness
            .job(config())
            .run(&symbols(&["AAPL"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.provider.calls("AAPL"), 0);
        assert_eq!(summary.snapshot.skipped, 1);
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_persistent_failure_uses_exact_attempts() {
        let harness = Harness::new();
        harness.provider.always_fail("ZZZZ", not_found("ZZZZ"));

        let summary = harness
            .job(config())
            .run(&symbols(&["ZZZZ"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.provider.calls("ZZZZ"), 2);
        assert_eq!(summary.snapshot.failed, 1);
        assert_eq!(summary.snapshot.errors.len(), 1);
        assert_eq!(summary.snapshot.errors[0].symbol, "ZZZZ");
        assert!(summary.snapshot.errors[0].message.contains("Symbol not found"));
        assert!(harness.store.get("ZZZZ").is_none());
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_batches_are_paced_by_real_delay() {
        let harness = Harness::new();
        let job = harness.job(config()).with_sleeper(Arc::new(TokioSleeper));

        let summary = job
            .run(&TargetSelection::Tier(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.snapshot.total, 5);
        assert_eq!(summary.snapshot.successful, 5);
        // 5 batches of one symbol, 4 gaps of 100ms
        assert!(summary.snapshot.time_elapsed_ms >= 400);
    }

    #[tokio::test]
    async fn test_sleeps_once_between_each_pair_of_batches() {
        let harness = Harness::new();
        let config = PopulateConfig {
            batch_size: 2,
            ..config()
        };

        let summary = harness
            .job(config)
            .run(&TargetSelection::Tier(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.snapshot.successful, 5);
        assert_eq!(harness.sleeper.recorded(), vec![Duration::from_millis(100); 2]);
    }

    #[tokio::test]
    async fn test_batch_symbols_run_concurrently() {
        let harness =
            Harness::with_provider(ScriptedProvider::new().with_latency(Duration::from_millis(50)));
        let config = PopulateConfig {
            batch_size: 3,
            ..config()
        };

        harness
            .job(config)
            .run(&TargetSelection::Tier(1), &CancellationToken::new())
            .await
            .unwrap();

        let peak = harness.provider.max_in_flight();
        assert!(peak > 1 && peak <= 3, "peak in-flight was {}", peak);
    }

    #[tokio::test]
    async fn test_force_refresh_rewrites_fresh_entry() {
        let harness = Harness::new();
        let old_expiry = Utc::now() + ChronoDuration::hours(1);
        harness.store.insert_entry(cache_entry("MSFT", old_expiry));

        let config = PopulateConfig {
            force_refresh: true,
            ..config()
        };
        let summary = harness
            .job(config)
            .run(&symbols(&["MSFT"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.provider.calls("MSFT"), 1);
        assert_eq!(summary.snapshot.successful, 1);

        let entry = harness.store.get("MSFT").unwrap();
        assert!(entry.expires_at > old_expiry);
        assert_eq!(entry.generation_count, 2);
        assert_eq!(entry.source, "population-job");
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let harness = Harness::new();
        let job = harness.job(config());
        let cancel = CancellationToken::new();

        let first = job.run(&TargetSelection::Tier(2), &cancel).await.unwrap();
        let second = job.run(&TargetSelection::Tier(2), &cancel).await.unwrap();

        assert_eq!(first.snapshot.successful, 5);
        assert_eq!(second.snapshot.skipped, second.snapshot.total);
        assert_eq!(harness.provider.total_calls(), 5);
        assert_eq!(harness.store.stats().entries, 5);
    }

    #[tokio::test]
    async fn test_every_symbol_reaches_one_terminal_state() {
        let harness = Harness::new();
        harness
            .store
            .insert_entry(cache_entry("AAPL", Utc::now() + ChronoDuration::hours(3)));
        harness.provider.always_fail("NVDA", not_found("NVDA"));
        harness
            .provider
            .fail_times("AMZN", 1, ProviderError::Network("reset".to_string()));

        let config = PopulateConfig {
            batch_size: 2,
            ..config()
        };
        let summary = harness
            .job(config)
            .run(&TargetSelection::Tier(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_accounting(&summary);
        assert!(summary.snapshot.is_complete());
        assert_eq!(summary.snapshot.skipped, 1);
        assert_eq!(summary.snapshot.failed, 1);
        assert_eq!(summary.snapshot.successful, 3);
        assert_eq!(harness.provider.calls("AMZN"), 2);
        for symbol in ["MSFT", "NVDA", "AMZN", "GOOGL"] {
            assert!(harness.provider.calls(symbol) <= 2);
        }
    }

    #[tokio::test]
    async fn test_fail_fast_stops_scheduling_batches() {
        let harness = Harness::new();
        harness.provider.always_fail("ZZZZ", not_found("ZZZZ"));

        let config = PopulateConfig {
            continue_on_error: false,
            ..config()
        };
        let summary = harness
            .job(config)
            .run(&symbols(&["AAPL", "ZZZZ", "MSFT", "NVDA"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            summary.status,
            RunStatus::Aborted {
                symbol: "ZZZZ".to_string()
            }
        );
        assert_eq!(summary.snapshot.completed, 2);
        assert_eq!(summary.remaining(), 2);
        assert_eq!(harness.provider.calls("MSFT"), 0);
        assert_accounting(&summary);
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_batch() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = harness
            .job(config())
            .run(&TargetSelection::Tier(1), &cancel)
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.snapshot.completed, 0);
        assert_eq!(summary.remaining(), 5);
        assert_eq!(harness.provider.total_calls(), 0);
        assert_eq!(summary.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_batch_delay() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let observer: Arc<dyn ProgressObserver> =
            Arc::new(move |_: &ProgressSnapshot| trigger.cancel());

        let config = PopulateConfig {
            delay_between_batches_ms: 60_000,
            ..config()
        };
        let job = harness
            .job(config)
            .with_sleeper(Arc::new(TokioSleeper))
            .with_observer(observer);

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            job.run(&TargetSelection::Tier(1), &cancel),
        )
        .await
        .expect("cancellation should interrupt the delay")
        .unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.snapshot.completed, 1);
        assert_eq!(summary.remaining(), 4);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_retried() {
        let harness = Harness::new();
        harness.store.set_fail_trade_plan_writes(true);

        let summary = harness
            .job(config())
            .run(&symbols(&["AAPL"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.provider.calls("AAPL"), 1);
        assert_eq!(summary.snapshot.failed, 1);
        assert!(summary.snapshot.errors[0].message.contains("trade plan upsert"));
        assert_eq!(summary.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_freshness_lookup_failure_refetches() {
        let harness = Harness::new();
        harness
            .store
            .insert_entry(cache_entry("AAPL", Utc::now() + ChronoDuration::hours(1)));
        harness.store.set_fail_reads(true);

        let summary = harness
            .job(config())
            .run(&symbols(&["AAPL"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(harness.provider.calls("AAPL"), 1);
        assert_eq!(summary.snapshot.successful, 1);
    }

    #[tokio::test]
    async fn test_observer_receives_snapshot_per_symbol() {
        let harness = Harness::new();
        let (observer, mut rx) = ChannelObserver::new();

        let summary = harness
            .job(config())
            .with_observer(Arc::new(observer))
            .run(&TargetSelection::Tier(1), &CancellationToken::new())
            .await
            .unwrap();

        let mut completed = Vec::new();
        while let Ok(snapshot) = rx.try_recv() {
            completed.push(snapshot.completed);
        }
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);
        assert_eq!(summary.snapshot.completed, 5);
    }

    #[tokio::test]
    async fn test_invalid_selection_fails_before_processing() {
        let harness = Harness::new();
        let job = harness.job(config());
        let cancel = CancellationToken::new();

        let err = job.run(&TargetSelection::Tier(9), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::InvalidTier(9))));

        let err = job.run(&symbols(&[" "]), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::EmptySymbolList)));

        assert_eq!(harness.provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_max_symbols_caps_selection() {
        let harness = Harness::new();
        let config = PopulateConfig {
            max_symbols: Some(3),
            ..config()
        };

        let summary = harness
            .job(config)
            .run(&TargetSelection::All, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.snapshot.total, 3);
        assert_eq!(harness.provider.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_target_list_completes_immediately() {
        let harness = Harness::new();
        let summary = harness
            .job(config())
            .run_targets(Vec::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.snapshot.total, 0);
        assert!(harness.sleeper.recorded().is_empty());
        assert_eq!(summary.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_summary_display_lists_failures() {
        let harness = Harness::new();
        harness.provider.always_fail("ZZZZ", not_found("ZZZZ"));

        let summary = harness
            .job(config())
            .run(&symbols(&["AAPL", "ZZZZ"]), &CancellationToken::new())
            .await
            .unwrap();

        let rendered = summary.to_string();
        assert!(rendered.contains("completed"));
        assert!(rendered.contains("Successful: 1"));
        assert!(rendered.contains("Failed:     1"));
        assert!(rendered.contains("ZZZZ: Fetch failed for ZZZZ after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_oversized_max_age_fails_before_processing() {
        let harness = Harness::new();
        let config = PopulateConfig {
            max_age_hours: 99_999_999_999,
            ..config()
        };
        let job = harness.job(config);
        let cancel = CancellationToken::new();

        let err = job.run(&symbols(&["AAPL"]), &cancel).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::InvalidValue { ref key, .. }) if key == "max_age_hours"
        ));

        let err = job
            .run_targets(vec!["AAPL".to_string()], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(harness.provider.total_calls(), 0);
    }

    #[test]
    fn test_run_guard_skips_overlap_and_releases() {
        let flag = AtomicBool::new(false);

        let guard = RunGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(RunGuard::acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(RunGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_run_guard_releases_on_panic() {
        let flag = AtomicBool::new(false);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = RunGuard::acquire(&flag);
            panic!("run blew up");
        }));

        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_register_with_scheduler() {
        let harness = Harness::new();
        let job = Arc::new(harness.job(config()));
        let scheduler = JobScheduler::new().await.unwrap();

        let result = Arc::clone(&job)
            .register(&scheduler, "0 0 */6 * * *", TargetSelection::Tier(1), CancellationToken::new())
            .await;
        assert!(result.is_ok());

        let result = job
            .register(&scheduler, "not a cron", TargetSelection::All, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(EngineError::Scheduler(_))));
    }
}
