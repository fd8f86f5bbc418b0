use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::GenerationPolicy;
use crate::database::connection::DatabaseError;
use crate::database::models::{
    NewStockAnalytics, NewTradePlanCacheEntry, StockAnalytics, TradePlanCacheEntry,
};
use crate::database::repositories::{AnalyticsRepository, TradePlanRepository};

/// Write counters for the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    pub entries: usize,
    pub trade_plan_upserts: u64,
    pub analytics_upserts: u64,
}

/// In-memory cache store implementing both repositories
///
/// Used by tests and `--dry-run`. Supports failure injection so callers can
/// exercise read and write error paths.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, TradePlanCacheEntry>>,
    analytics: Arc<DashMap<String, StockAnalytics>>,
    trade_plan_upserts: Arc<AtomicU64>,
    analytics_upserts: Arc<AtomicU64>,
    fail_reads: Arc<AtomicBool>,
    fail_trade_plan_writes: Arc<AtomicBool>,
    fail_analytics_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry directly, bypassing upsert bookkeeping
    pub fn insert_entry(&self, entry: TradePlanCacheEntry) {
        self.entries.insert(entry.symbol.clone(), entry);
    }

    pub fn get(&self, symbol: &str) -> Option<TradePlanCacheEntry> {
        self.entries.get(symbol).map(|e| e.value().clone())
    }

    pub fn get_analytics(&self, symbol: &str) -> Option<StockAnalytics> {
        self.analytics.get(symbol).map(|a| a.value().clone())
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    pub fn set_fail_trade_plan_writes(&self, fail: bool) {
        self.fail_trade_plan_writes.store(fail, Ordering::Release);
    }

    pub fn set_fail_analytics_writes(&self, fail: bool) {
        self.fail_analytics_writes.store(fail, Ordering::Release);
    }

    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            entries: self.entries.len(),
            trade_plan_upserts: self.trade_plan_upserts.load(Ordering::Relaxed),
            analytics_upserts: self.analytics_upserts.load(Ordering::Relaxed),
        }
    }
}

impl TradePlanRepository for InMemoryStore {
    fn find_by_symbol(&self, symbol: &str) -> Result<Option<TradePlanCacheEntry>, DatabaseError> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(DatabaseError::ConnectionFailed("injected read failure".to_string()));
        }
        Ok(self.get(symbol))
    }

    fn upsert(
        &self,
        entry: NewTradePlanCacheEntry,
        policy: GenerationPolicy,
    ) -> Result<TradePlanCacheEntry, DatabaseError> {
        if self.fail_trade_plan_writes.load(Ordering::Acquire) {
            return Err(DatabaseError::QueryError("injected write failure".to_string()));
        }

        // The shard lock held by `entry()` makes read-modify-write atomic per symbol
        let stored = match self.entries.entry(entry.symbol.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                current.trade_plan = entry.trade_plan;
                current.summary = entry.summary;
                current.description = entry.description;
                if entry.reference_price.is_some() {
                    current.reference_price = entry.reference_price;
                    current.reference_price_updated_at = entry.reference_price_updated_at;
                }
                current.priority = entry.priority;
                current.is_active = entry.is_active;
                current.expires_at = entry.expires_at;
                current.generation_count = policy.next(Some(current.generation_count));
                current.last_accessed_at = entry.last_accessed_at;
                current.source = entry.source;
                current.updated_at = entry.updated_at;
                current.clone()
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let created = TradePlanCacheEntry {
                    symbol: entry.symbol,
                    trade_plan: entry.trade_plan,
                    summary: entry.summary,
                    description: entry.description,
                    reference_price: entry.reference_price,
                    reference_price_updated_at: entry.reference_price_updated_at,
                    priority: entry.priority,
                    is_active: entry.is_active,
                    expires_at: entry.expires_at,
                    generation_count: policy.next(None),
                    last_accessed_at: entry.last_accessed_at,
                    source: entry.source,
                    created_at: entry.updated_at,
                    updated_at: entry.updated_at,
                };
                vacant.insert(created.clone());
                created
            }
        };

        self.trade_plan_upserts.fetch_add(1, Ordering::Relaxed);
        Ok(stored)
    }

    fn count_fresh(&self, now: DateTime<Utc>) -> Result<i64, DatabaseError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.value().is_fresh(now))
            .count() as i64)
    }

    fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<TradePlanCacheEntry>, DatabaseError> {
        let mut expiring: Vec<TradePlanCacheEntry> = self
            .entries
            .iter()
            .filter(|e| e.value().is_active && e.value().expires_at < before)
            .map(|e| e.value().clone())
            .collect();
        expiring.sort_by_key(|e| e.expires_at);
        Ok(expiring)
    }
}

impl AnalyticsRepository for InMemoryStore {
    fn record_access(&self, record: NewStockAnalytics) -> Result<StockAnalytics, DatabaseError> {
        if self.fail_analytics_writes.load(Ordering::Acquire) {
            return Err(DatabaseError::QueryError("injected analytics failure".to_string()));
        }

        let now = Utc::now();
        let mut row = self
            .analytics
            .entry(record.symbol.clone())
            .or_insert_with(|| StockAnalytics {
                symbol: record.symbol.clone(),
                display_name: record.display_name.clone(),
                priority: record.priority,
                last_accessed_at: record.last_accessed_at,
                access_count: 0,
                created_at: now,
                updated_at: now,
            });

        row.display_name = record.display_name;
        row.priority = record.priority;
        row.last_accessed_at = record.last_accessed_at;
        row.access_count += 1;
        row.updated_at = now;

        self.analytics_upserts.fetch_add(1, Ordering::Relaxed);
        Ok(row.clone())
    }

    fn find_by_symbol(&self, symbol: &str) -> Result<Option<StockAnalytics>, DatabaseError> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(DatabaseError::ConnectionFailed("injected read failure".to_string()));
        }
        Ok(self.get_analytics(symbol))
    }
}
