use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-symbol analytics row, read by reporting elsewhere
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::stock_analytics)]
#[diesel(primary_key(symbol))]
pub struct StockAnalytics {
    pub symbol: String,

    /// Company name from the catalog, or the symbol itself
    pub display_name: String,

    pub priority: i32,

    pub last_accessed_at: DateTime<Utc>,

    /// Number of recorded accesses (population writes included)
    pub access_count: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Upsert payload for an analytics row
#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::stock_analytics)]
pub struct NewStockAnalytics {
    pub symbol: String,
    pub display_name: String,
    pub priority: i32,
    pub last_accessed_at: DateTime<Utc>,
}

impl NewStockAnalytics {
    pub fn new(
        symbol: String,
        display_name: String,
        priority: i32,
        last_accessed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            display_name,
            priority,
            last_accessed_at,
        }
    }
}
