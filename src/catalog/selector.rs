//! Target selection: which symbols a population run processes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::provider::{CatalogProvider, TIER_COUNT};
use crate::engine::errors::ConfigError;

/// Where the run's symbols come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelection {
    /// Explicit list, processed even if not in the catalog
    Symbols(Vec<String>),
    /// One priority band (1-5)
    Tier(u8),
    /// The whole catalog
    All,
}

impl TargetSelection {
    /// Apply flag precedence: symbols > tier > all
    pub fn from_flags(symbols: Option<Vec<String>>, tier: Option<u8>) -> Self {
        match (symbols, tier) {
            (Some(symbols), _) => TargetSelection::Symbols(symbols),
            (None, Some(tier)) => TargetSelection::Tier(tier),
            (None, None) => TargetSelection::All,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TargetSelection::Symbols(symbols) => format!("{} explicit symbol(s)", symbols.len()),
            TargetSelection::Tier(tier) => format!("tier {}", tier),
            TargetSelection::All => "entire catalog".to_string(),
        }
    }
}

/// Parse a user-supplied tier, rejecting anything outside 1..=TIER_COUNT
pub fn parse_tier(raw: &str) -> Result<u8, ConfigError> {
    let level: i64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: "tier".to_string(),
        value: raw.to_string(),
    })?;

    u8::try_from(level)
        .ok()
        .filter(|l| (1..=TIER_COUNT).contains(l))
        .ok_or(ConfigError::InvalidTier(level))
}

/// Resolve a selection to an ordered, deduplicated symbol list capped at `max_symbols`
pub fn select_targets(
    catalog: &dyn CatalogProvider,
    selection: &TargetSelection,
    max_symbols: Option<usize>,
) -> Result<Vec<String>, ConfigError> {
    let candidates = match selection {
        TargetSelection::Symbols(symbols) => {
            let normalized: Vec<String> = symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if normalized.is_empty() {
                return Err(ConfigError::EmptySymbolList);
            }
            normalized
        }
        TargetSelection::Tier(level) => catalog.tier(*level)?,
        TargetSelection::All => catalog.all_symbols(),
    };

    let mut seen = HashSet::with_capacity(candidates.len());
    let mut targets: Vec<String> = candidates
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect();

    if let Some(max) = max_symbols {
        targets.truncate(max);
    }

    Ok(targets)
}
