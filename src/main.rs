use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trade_plan_cache::database::repositories::{
    AnalyticsRepository, AnalyticsRepositoryImpl, TradePlanRepository, TradePlanRepositoryImpl,
};
use trade_plan_cache::database::{establish_connection_pool, InMemoryStore};
use trade_plan_cache::metrics::{ProgressSnapshot, SymbolOutcome, TracingObserver};
use trade_plan_cache::catalog::parse_tier;
use trade_plan_cache::{
    select_targets, CachePopulationJob, CatalogProvider, ConfigError, DatabaseConfig, EngineError,
    GenerationPolicy, HttpTradePlanProvider, PopulateConfig, ProviderConfig, StaticCatalog,
    TargetSelection,
};

#[derive(Parser, Debug)]
#[command(
    name = "trade-plan-cache",
    version,
    about = "Populate and refresh the trade plan cache"
)]
struct Cli {
    /// Process the entire catalog (the default when no selection is given).
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Process one priority band, 1 (highest) to 5.
    #[arg(long, allow_hyphen_values = true)]
    tier: Option<String>,

    /// Comma-separated symbols, e.g. AAPL,MSFT. Takes precedence over --tier.
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Ignore freshness and refetch everything selected.
    #[arg(long, default_value_t = false)]
    refresh: bool,

    /// Cache entry lifetime in hours.
    #[arg(long)]
    age: Option<i64>,

    /// Process at most this many symbols.
    #[arg(long)]
    limit: Option<usize>,

    /// Symbols processed concurrently per batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Total fetch attempts per symbol.
    #[arg(long)]
    retries: Option<u32>,

    /// Stop scheduling new batches after the first failed symbol.
    #[arg(long, default_value_t = false)]
    fail_fast: bool,

    /// How generation_count evolves on refresh: increment or reset.
    #[arg(long)]
    generation_policy: Option<GenerationPolicy>,

    /// TOML catalog file. Defaults to CATALOG_PATH, then the built-in list.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Run on a cron schedule (e.g. "0 0 */6 * * *") instead of once.
    #[arg(long)]
    schedule: Option<String>,

    /// Write to an in-memory store instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

impl Cli {
    /// Precedence: --symbols, then --tier, then --all (the default)
    fn selection(&self) -> Result<TargetSelection, ConfigError> {
        if self.symbols.is_some() {
            return Ok(TargetSelection::from_flags(self.symbols.clone(), None));
        }
        let tier = self.tier.as_deref().map(parse_tier).transpose()?;
        if self.all && tier.is_none() {
            return Ok(TargetSelection::All);
        }
        Ok(TargetSelection::from_flags(None, tier))
    }

    fn populate_config(&self) -> Result<PopulateConfig, ConfigError> {
        self.apply_overrides(PopulateConfig::from_env()?)
    }

    /// Flags win over environment values
    fn apply_overrides(&self, mut config: PopulateConfig) -> Result<PopulateConfig, ConfigError> {
        if let Some(age) = self.age {
            config.max_age_hours = age;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.delay_between_batches_ms = delay_ms;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(policy) = self.generation_policy {
            config.generation_policy = policy;
        }
        if let Some(limit) = self.limit {
            config.max_symbols = Some(limit);
        }
        config.force_refresh = self.refresh;
        config.continue_on_error = !self.fail_fast;

        config.validate()?;
        Ok(config)
    }

    fn load_catalog(&self) -> Result<StaticCatalog, EngineError> {
        let path = self
            .catalog
            .clone()
            .or_else(|| std::env::var("CATALOG_PATH").ok().map(PathBuf::from));

        match path {
            Some(path) => {
                let catalog = StaticCatalog::from_file(&path)?;
                tracing::info!("📚 Loaded {} catalog symbols from {}", catalog.len(), path.display());
                Ok(catalog)
            }
            None => Ok(StaticCatalog::builtin()),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries progress and the summary
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trade_plan_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    std::process::exit(exit_code(run(cli).await));
}

fn exit_code(result: Result<i32, EngineError>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run(cli: Cli) -> Result<i32, EngineError> {
    // Everything checkable offline is checked before connecting anywhere
    let config = cli.populate_config()?;
    let selection = cli.selection()?;
    let catalog: Arc<dyn CatalogProvider> = Arc::new(cli.load_catalog()?);
    let targets = select_targets(catalog.as_ref(), &selection, config.max_symbols)?;

    let (trade_plans, analytics) = initialize_store(cli.dry_run)?;
    let provider = Arc::new(HttpTradePlanProvider::new(&ProviderConfig::from_env()?)?);

    let job = CachePopulationJob::new(catalog, Arc::clone(&trade_plans), analytics, provider, config)
        .with_observer(Arc::new(TracingObserver))
        .with_observer(Arc::new(print_progress));

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⚠️  Interrupt received, finishing in-flight symbols");
            ctrl_c_token.cancel();
        }
    });

    match cli.schedule {
        Some(schedule) => {
            run_scheduled(Arc::new(job), &schedule, selection, cancel).await?;
            Ok(0)
        }
        None => {
            tracing::info!("Selected {} symbol(s) from {}", targets.len(), selection.describe());
            let summary = job.run_targets(targets, &cancel).await?;
            println!("{}", summary);

            let repository = Arc::clone(&trade_plans);
            match tokio::task::spawn_blocking(move || repository.count_fresh(Utc::now())).await {
                Ok(Ok(fresh)) => println!("Fresh cache entries: {}", fresh),
                Ok(Err(e)) => tracing::warn!("Could not count fresh cache entries: {}", e),
                Err(e) => tracing::warn!("Fresh entry count task failed: {}", e),
            }

            Ok(summary.exit_code())
        }
    }
}

type Stores = (Arc<dyn TradePlanRepository>, Arc<dyn AnalyticsRepository>);

/// Connect to PostgreSQL and apply pending migrations, or use an in-memory store
fn initialize_store(dry_run: bool) -> Result<Stores, EngineError> {
    if dry_run {
        tracing::info!("🧪 Dry run: writing to an in-memory store");
        let store = InMemoryStore::new();
        let trade_plans: Arc<dyn TradePlanRepository> = Arc::new(store.clone());
        let analytics: Arc<dyn AnalyticsRepository> = Arc::new(store);
        return Ok((trade_plans, analytics));
    }

    let db_config = DatabaseConfig::from_env()?;

    tracing::info!("🗄️  Initializing PostgreSQL connection...");
    let pool = establish_connection_pool(&db_config.url, db_config.pool_size)?;
    let applied = pool.run_migrations()?;
    tracing::info!("✅ Database ready ({} migration(s) applied)", applied);

    let pool_clone = pool.clone();
    let trade_plans = Arc::new(TradePlanRepositoryImpl::new(move || pool_clone.get_conn()))
        as Arc<dyn TradePlanRepository>;

    let pool_clone = pool.clone();
    let analytics = Arc::new(AnalyticsRepositoryImpl::new(move || pool_clone.get_conn()))
        as Arc<dyn AnalyticsRepository>;

    Ok((trade_plans, analytics))
}

/// Register the job with a cron scheduler and wait for Ctrl-C
async fn run_scheduled(
    job: Arc<CachePopulationJob>,
    schedule: &str,
    selection: TargetSelection,
    shutdown: CancellationToken,
) -> Result<(), EngineError> {
    tracing::info!("⏰ Initializing cron scheduler...");

    let mut scheduler = JobScheduler::new()
        .await
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

    job.register(&scheduler, schedule, selection, shutdown.clone())
        .await?;

    scheduler
        .start()
        .await
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

    tracing::info!("✅ Cron scheduler started, press Ctrl-C to stop");

    shutdown.cancelled().await;

    scheduler
        .shutdown()
        .await
        .map_err(|e| EngineError::Scheduler(e.to_string()))?;

    tracing::info!("Cron scheduler stopped");
    Ok(())
}

fn print_progress(snapshot: &ProgressSnapshot) {
    let symbol = snapshot.current_symbol.as_deref().unwrap_or("-");
    let outcome = match snapshot.last_outcome {
        Some(SymbolOutcome::Written) => "cached",
        Some(SymbolOutcome::Skipped) => "fresh, skipped",
        Some(SymbolOutcome::Failed) => "FAILED",
        None => "",
    };
    let eta = snapshot
        .estimated_time_remaining_ms
        .map(|ms| format!(", ~{:.0}s left", ms as f64 / 1000.0))
        .unwrap_or_default();

    println!(
        "[{}/{} {:>3.0}%] {} {}{}",
        snapshot.completed,
        snapshot.total,
        snapshot.percent_complete(),
        symbol,
        outcome,
        eta
    );
}
