pub mod analytics;
pub mod trade_plan;

pub use analytics::{NewStockAnalytics, StockAnalytics};
pub use trade_plan::{NewTradePlanCacheEntry, TradePlanCacheEntry};
