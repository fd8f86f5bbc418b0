use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::models::{NewStockAnalytics, StockAnalytics};
use crate::database::schema::stock_analytics;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use std::sync::Arc;

/// Analytics repository - access bookkeeping used only for reporting
pub trait AnalyticsRepository: Send + Sync {
    /// Upsert the analytics row and bump its access count
    fn record_access(&self, record: NewStockAnalytics) -> Result<StockAnalytics, DatabaseError>;

    /// Find analytics for a symbol
    fn find_by_symbol(&self, symbol: &str) -> Result<Option<StockAnalytics>, DatabaseError>;
}

/// PostgreSQL implementation of AnalyticsRepository
pub struct AnalyticsRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,
}

impl AnalyticsRepositoryImpl {
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

impl AnalyticsRepository for AnalyticsRepositoryImpl {
    fn record_access(&self, record: NewStockAnalytics) -> Result<StockAnalytics, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        diesel::insert_into(stock_analytics::table)
            .values(&record)
            .on_conflict(stock_analytics::symbol)
            .do_update()
            .set((
                stock_analytics::display_name.eq(excluded(stock_analytics::display_name)),
                stock_analytics::priority.eq(excluded(stock_analytics::priority)),
                stock_analytics::last_accessed_at.eq(excluded(stock_analytics::last_accessed_at)),
                stock_analytics::access_count.eq(stock_analytics::access_count + 1),
                stock_analytics::updated_at.eq(Utc::now()),
            ))
            .get_result::<StockAnalytics>(&mut conn)
            .map_err(DatabaseError::from)
    }

    fn find_by_symbol(&self, symbol: &str) -> Result<Option<StockAnalytics>, DatabaseError> {
        let mut conn = (self.get_conn)()?;

        stock_analytics::table
            .filter(stock_analytics::symbol.eq(symbol))
            .first::<StockAnalytics>(&mut conn)
            .optional()
            .map_err(DatabaseError::from)
    }
}
