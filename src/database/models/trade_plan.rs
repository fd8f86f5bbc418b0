use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cached trade plan for one symbol
///
/// At most one row per symbol. Rows are never deleted by the population
/// engine; `is_active = false` hides an entry without removing it.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::trade_plan_cache)]
#[diesel(primary_key(symbol))]
pub struct TradePlanCacheEntry {
    /// Ticker, upper-case (e.g., "AAPL")
    pub symbol: String,

    /// Opaque trade plan payload as returned by the provider
    pub trade_plan: serde_json::Value,

    /// One-line summary derived from the plan
    pub summary: String,

    /// Longer description derived from the plan
    pub description: String,

    /// Last known price snapshot
    pub reference_price: Option<Decimal>,

    /// When `reference_price` was captured
    pub reference_price_updated_at: Option<DateTime<Utc>>,

    /// Catalog priority (0 if the symbol is not in the catalog)
    pub priority: i32,

    /// Inactive entries are stored but never served
    pub is_active: bool,

    /// Entry is stale at or after this instant
    pub expires_at: DateTime<Utc>,

    /// How many times the plan has been generated
    pub generation_count: i32,

    pub last_accessed_at: Option<DateTime<Utc>>,

    /// Writer that produced this row
    pub source: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TradePlanCacheEntry {
    /// Fresh iff active and not yet expired
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

/// Upsert payload for a cache entry
#[derive(Debug, Clone, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::trade_plan_cache)]
#[diesel(primary_key(symbol))]
pub struct NewTradePlanCacheEntry {
    pub symbol: String,
    pub trade_plan: serde_json::Value,
    pub summary: String,
    pub description: String,
    pub reference_price: Option<Decimal>,
    pub reference_price_updated_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    /// Overwritten by the repository according to the generation policy
    pub generation_count: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl NewTradePlanCacheEntry {
    /// Create an active entry written at `written_at`
    pub fn new(
        symbol: String,
        trade_plan: serde_json::Value,
        summary: String,
        description: String,
        expires_at: DateTime<Utc>,
        source: String,
        written_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            trade_plan,
            summary,
            description,
            reference_price: None,
            reference_price_updated_at: None,
            priority: 0,
            is_active: true,
            expires_at,
            generation_count: 1,
            last_accessed_at: Some(written_at),
            source,
            updated_at: written_at,
        }
    }

    /// Set the price snapshot
    pub fn with_reference_price(mut self, price: Decimal, at: DateTime<Utc>) -> Self {
        self.reference_price = Some(price);
        self.reference_price_updated_at = Some(at);
        self
    }

    /// Set the catalog priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
