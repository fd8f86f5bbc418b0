use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::models::TradePlanCacheEntry;
use crate::database::repositories::TradePlanRepository;

/// Cache state of one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Freshness {
    /// Active and not yet expired
    Fresh { expires_at: DateTime<Utc> },
    /// Present but expired, inactive, or refresh forced
    Stale,
    /// No entry (or the lookup failed)
    Missing,
}

impl Freshness {
    /// Classify a stored entry at `now`
    pub fn classify(entry: &TradePlanCacheEntry, now: DateTime<Utc>) -> Self {
        if entry.is_fresh(now) {
            Freshness::Fresh {
                expires_at: entry.expires_at,
            }
        } else {
            Freshness::Stale
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }

    pub fn needs_fetch(&self) -> bool {
        !self.is_fresh()
    }
}

/// Decides whether a symbol's cached plan can be reused
///
/// Read-only. A failed lookup is reported as `Missing` so the symbol gets
/// refetched rather than skipped.
pub struct FreshnessChecker {
    repository: Arc<dyn TradePlanRepository>,
}

impl FreshnessChecker {
    pub fn new(repository: Arc<dyn TradePlanRepository>) -> Self {
        Self { repository }
    }

    pub async fn check(&self, symbol: &str, force_refresh: bool) -> Freshness {
        if force_refresh {
            return Freshness::Stale;
        }

        let repository = Arc::clone(&self.repository);
        let key = symbol.to_string();
        let lookup = tokio::task::spawn_blocking(move || repository.find_by_symbol(&key)).await;

        let freshness = match lookup {
            Ok(Ok(Some(entry))) => Freshness::classify(&entry, Utc::now()),
            Ok(Ok(None)) => Freshness::Missing,
            Ok(Err(e)) => {
                warn!(symbol = %symbol, error = %e, "Freshness lookup failed, treating as missing");
                Freshness::Missing
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Freshness lookup task failed, treating as missing");
                Freshness::Missing
            }
        };

        debug!(symbol = %symbol, ?freshness, "Checked cache freshness");
        freshness
    }
}
