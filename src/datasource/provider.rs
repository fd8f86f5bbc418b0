//! Trade plan provider trait and structured error types.
//!
//! The provider is the external artifact-generation call. It knows nothing
//! about retries, pacing, or the cache; those belong to the engine.

use async_trait::async_trait;
use thiserror::Error;

use super::plan::TradePlan;

/// Errors from a single provider call
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("Symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Provider error: {0}")]
    Other(String),
}

/// External trade plan generator
#[async_trait]
pub trait TradePlanProvider: Send + Sync {
    /// Human-readable name of this provider
    fn name(&self) -> &str;

    /// Generate (or fetch) the trade plan for one symbol
    async fn generate(&self, symbol: &str) -> Result<TradePlan, ProviderError>;
}
