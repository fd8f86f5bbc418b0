use crate::config::GenerationPolicy;
use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::models::{NewTradePlanCacheEntry, TradePlanCacheEntry};
use crate::database::schema::trade_plan_cache;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;

/// Trade plan cache repository - the narrow store interface the engine needs
///
/// Keyed by symbol; `upsert` never creates a second row for the same symbol.
pub trait TradePlanRepository: Send + Sync {
    /// Find the cache entry for a symbol
    fn find_by_symbol(&self, symbol: &str) -> Result<Option<TradePlanCacheEntry>, DatabaseError>;

    /// Insert or update the entry for `entry.symbol`
    ///
    /// `generation_count` is computed from the stored value and `policy`.
    fn upsert(
        &self,
        entry: NewTradePlanCacheEntry,
        policy: GenerationPolicy,
    ) -> Result<TradePlanCacheEntry, DatabaseError>;

    /// Count active entries that have not expired at `now`
    fn count_fresh(&self, now: DateTime<Utc>) -> Result<i64, DatabaseError>;

    /// Active entries expiring before `before`, soonest first
    fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<TradePlanCacheEntry>, DatabaseError>;
}

/// PostgreSQL implementation of TradePlanRepository
pub struct TradePlanRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,
}

impl TradePlanRepositoryImpl {
    /// Create new repository with connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }
}

impl TradePlanRepository for TradePlanRepositoryImpl {
    fn find_by_symbol(&self, symbol: &str) -> Result<Option<TradePlanCacheEntry>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        trade_plan_cache::table
            .filter(trade_plan_cache::symbol.eq(symbol))
            .first::<TradePlanCacheEntry>(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }

    fn upsert(
        &self,
        mut entry: NewTradePlanCacheEntry,
        policy: GenerationPolicy,
    ) -> Result<TradePlanCacheEntry, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        // Row lock keeps concurrent refreshes of one symbol from losing an increment
        conn.transaction::<_, DatabaseError, _>(move |conn| {
            let previous = trade_plan_cache::table
                .filter(trade_plan_cache::symbol.eq(&entry.symbol))
                .select(trade_plan_cache::generation_count)
                .for_update()
                .first::<i32>(conn)
                .optional()?;

            entry.generation_count = policy.next(previous);

            let stored = diesel::insert_into(trade_plan_cache::table)
                .values(&entry)
                .on_conflict(trade_plan_cache::symbol)
                .do_update()
                .set(&entry)
                .get_result::<TradePlanCacheEntry>(conn)?;

            Ok(stored)
        })
    }

    fn count_fresh(&self, now: DateTime<Utc>) -> Result<i64, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        trade_plan_cache::table
            .filter(trade_plan_cache::is_active.eq(true))
            .filter(trade_plan_cache::expires_at.gt(now))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(DatabaseError::from)
    }

    fn list_expiring(&self, before: DateTime<Utc>) -> Result<Vec<TradePlanCacheEntry>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        trade_plan_cache::table
            .filter(trade_plan_cache::is_active.eq(true))
            .filter(trade_plan_cache::expires_at.lt(before))
            .order(trade_plan_cache::expires_at.asc())
            .load::<TradePlanCacheEntry>(&mut conn)
            .map_err(DatabaseError::from)
    }
}

