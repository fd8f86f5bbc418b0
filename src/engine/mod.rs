//! Population Engine Module
//!
//! Per-symbol pipeline components used by the population job:
//! - `errors` - Error types for configuration, fetch, and cache writes
//! - `pacing` - Injectable sleeper for backoff and batch delays
//! - `freshness` - Cache freshness check
//! - `retry` - Fetch executor with linear backoff
//! - `cache_writer` - Trade plan and analytics upserts

pub mod cache_writer;
pub mod errors;
pub mod freshness;
pub mod pacing;
pub mod retry;

// Re-export commonly used types for convenience
pub use cache_writer::CacheWriter;
pub use errors::{CacheWriteError, ConfigError, EngineError, FetchError, SymbolError, WriteStage};
pub use freshness::{Freshness, FreshnessChecker};
pub use pacing::{Sleeper, TokioSleeper};
pub use retry::{FetchExecutor, RetryPolicy};
