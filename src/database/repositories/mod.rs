/// Repository pattern implementations
///
/// - **TradePlanRepository**: one cache entry per symbol, upsert-only writes
/// - **AnalyticsRepository**: access bookkeeping for reporting
///
/// The engine depends on the traits; PostgreSQL implementations live here and
/// an in-memory implementation lives in `database::memory`.

pub mod analytics_repository;
pub mod trade_plan_repository;

pub use analytics_repository::{AnalyticsRepository, AnalyticsRepositoryImpl};
pub use trade_plan_repository::{TradePlanRepository, TradePlanRepositoryImpl};
