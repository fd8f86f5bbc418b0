//! Error types for the population engine
//!
//! Fatal errors (`ConfigError`, `EngineError`) abort a run before or outside
//! the per-symbol loop. Per-symbol errors (`FetchError`, `CacheWriteError`,
//! wrapped in `SymbolError`) are recorded in the progress snapshot and never
//! escape the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::database::connection::DatabaseError;
use crate::datasource::ProviderError;

/// Invalid run parameters
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Tier outside 1..=5
    #[error("Invalid tier: {0} (expected 1-5)")]
    InvalidTier(i64),

    /// `--symbols` given but nothing usable in it
    #[error("Symbol list is empty")]
    EmptySymbolList,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    /// Catalog file could not be read or parsed
    #[error("Catalog error: {0}")]
    Catalog(String),
}

/// External trade plan generation failed on every attempt
#[derive(Debug, Error)]
#[error("Fetch failed for {symbol} after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub symbol: String,
    pub attempts: u32,
    #[source]
    pub source: ProviderError,
}

/// Which of the two upserts failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStage {
    TradePlan,
    Analytics,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStage::TradePlan => write!(f, "trade plan upsert"),
            WriteStage::Analytics => write!(f, "analytics upsert"),
        }
    }
}

/// Persistent store upsert failed (not retried)
#[derive(Debug, Error)]
#[error("Cache write failed for {symbol} during {stage}: {source}")]
pub struct CacheWriteError {
    pub symbol: String,
    pub stage: WriteStage,
    #[source]
    pub source: DatabaseError,
}

/// Terminal failure for a single symbol
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    CacheWrite(#[from] CacheWriteError),
}

impl SymbolError {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolError::Fetch(e) => &e.symbol,
            SymbolError::CacheWrite(e) => &e.symbol,
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        matches!(self, SymbolError::Fetch(_))
    }

    pub fn is_cache_write_error(&self) -> bool {
        matches!(self, SymbolError::CacheWrite(_))
    }
}

/// Fatal errors that terminate a run abnormally
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Provider client could not be constructed
    #[error("Provider setup error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}
