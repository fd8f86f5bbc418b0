// Library Crate Root
// lib.rs

// main.rs imports through lib.rs like an external crate
pub mod catalog;
pub mod config;
pub mod database;
pub mod datasource;
pub mod engine;
pub mod jobs;
pub mod metrics;
pub mod testing;

// pub use = re-export at crate root
pub use catalog::{select_targets, CatalogProvider, StaticCatalog, TargetSelection};
pub use config::{DatabaseConfig, GenerationPolicy, PopulateConfig, ProviderConfig};
pub use database::InMemoryStore;
pub use datasource::{HttpTradePlanProvider, TradePlan, TradePlanProvider};
pub use engine::{ConfigError, EngineError};
pub use jobs::{CachePopulationJob, RunStatus, RunSummary};
pub use metrics::{ProgressObserver, ProgressSnapshot};
