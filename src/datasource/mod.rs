//! Trade plan data source
//!
//! - `plan` - the trade plan artifact and its derived summary
//! - `provider` - provider trait and error types
//! - `http` - HTTP-backed provider used by the CLI

pub mod http;
pub mod plan;
pub mod provider;

pub use http::HttpTradePlanProvider;
pub use plan::{PlanSummary, TradePlan};
pub use provider::{ProviderError, TradePlanProvider};
