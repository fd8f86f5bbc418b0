use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::errors::{CacheWriteError, ConfigError, WriteStage};
use crate::catalog::CatalogProvider;
use crate::config::{GenerationPolicy, PopulateConfig};
use crate::database::connection::DatabaseError;
use crate::database::models::{NewStockAnalytics, NewTradePlanCacheEntry, TradePlanCacheEntry};
use crate::database::repositories::{AnalyticsRepository, TradePlanRepository};
use crate::datasource::TradePlan;

/// Persists a freshly generated plan and records analytics for its symbol
///
/// The two upserts are independent: a failed analytics write leaves the
/// trade plan row in place and is reported as a failure of the symbol.
pub struct CacheWriter {
    trade_plans: Arc<dyn TradePlanRepository>,
    analytics: Arc<dyn AnalyticsRepository>,
    catalog: Arc<dyn CatalogProvider>,
    max_age: chrono::Duration,
    generation_policy: GenerationPolicy,
    source: String,
}

impl CacheWriter {
    pub fn new(
        trade_plans: Arc<dyn TradePlanRepository>,
        analytics: Arc<dyn AnalyticsRepository>,
        catalog: Arc<dyn CatalogProvider>,
        config: &PopulateConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            trade_plans,
            analytics,
            catalog,
            max_age: config.max_age()?,
            generation_policy: config.generation_policy,
            source: config.source.clone(),
        })
    }

    pub async fn write(&self, plan: TradePlan) -> Result<TradePlanCacheEntry, CacheWriteError> {
        let symbol = plan.symbol.clone();
        let now = Utc::now();
        let summary = plan.summarize();
        let priority = self.catalog.priority_of(&symbol);
        let display_name = self
            .catalog
            .display_name(&symbol)
            .unwrap_or_else(|| symbol.clone());
        let expires_at = now
            .checked_add_signed(self.max_age)
            .ok_or_else(|| CacheWriteError {
                symbol: symbol.clone(),
                stage: WriteStage::TradePlan,
                source: DatabaseError::QueryError(format!(
                    "expiry out of range for max age {}",
                    self.max_age
                )),
            })?;

        let mut entry = NewTradePlanCacheEntry::new(
            symbol.clone(),
            plan.payload,
            summary.summary,
            summary.description,
            expires_at,
            self.source.clone(),
            now,
        )
        .with_priority(priority);
        if let Some(price) = plan.reference_price {
            entry = entry.with_reference_price(price, plan.generated_at);
        }
        let analytics = NewStockAnalytics::new(symbol.clone(), display_name, priority, now);

        let trade_plans = Arc::clone(&self.trade_plans);
        let analytics_repo = Arc::clone(&self.analytics);
        let policy = self.generation_policy;
        let task_symbol = symbol.clone();

        let stored = tokio::task::spawn_blocking(move || {
            let stored = trade_plans
                .upsert(entry, policy)
                .map_err(|source| CacheWriteError {
                    symbol: task_symbol.clone(),
                    stage: WriteStage::TradePlan,
                    source,
                })?;

            analytics_repo
                .record_access(analytics)
                .map_err(|source| CacheWriteError {
                    symbol: task_symbol,
                    stage: WriteStage::Analytics,
                    source,
                })?;

            Ok::<_, CacheWriteError>(stored)
        })
        .await
        .map_err(|e| CacheWriteError {
            symbol: symbol.clone(),
            stage: WriteStage::TradePlan,
            source: DatabaseError::QueryError(format!("write task failed: {}", e)),
        })??;

        debug!(
            symbol = %symbol,
            generation_count = stored.generation_count,
            expires_at = %stored.expires_at,
            "Cached trade plan"
        );

        Ok(stored)
    }
}
