//! Symbol catalog and target selection
//!
//! - `provider` - catalog trait, built-in and TOML-backed catalogs, tier bands
//! - `selector` - resolves a run's target symbols from flags

pub mod provider;
pub mod selector;

pub use provider::{CatalogEntry, CatalogProvider, StaticCatalog, TIER_COUNT};
pub use selector::{parse_tier, select_targets, TargetSelection};
