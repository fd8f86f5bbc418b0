//! Symbol catalog: which symbols exist, their display names, and priorities.
//!
//! The catalog is injected wherever it is needed so tests can substitute a
//! small fixture instead of the built-in list.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::engine::errors::ConfigError;

/// Number of priority bands
pub const TIER_COUNT: u8 = 5;

/// One catalog symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub symbol: String,
    pub name: String,
    /// Higher is more important
    pub priority: i32,
}

impl CatalogEntry {
    pub fn new(symbol: &str, name: &str, priority: i32) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            priority,
        }
    }
}

/// Source of catalog symbols, priorities, and tiers
pub trait CatalogProvider: Send + Sync {
    /// All entries, highest priority first
    fn entries(&self) -> &[CatalogEntry];

    /// Priority for a symbol, 0 if unknown
    fn priority_of(&self, symbol: &str) -> i32 {
        self.entries()
            .iter()
            .find(|e| e.symbol == symbol)
            .map(|e| e.priority)
            .unwrap_or(0)
    }

    /// Display name for a symbol
    fn display_name(&self, symbol: &str) -> Option<String> {
        self.entries()
            .iter()
            .find(|e| e.symbol == symbol)
            .map(|e| e.name.clone())
    }

    /// Every symbol, highest priority first
    fn all_symbols(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.symbol.clone()).collect()
    }

    /// Symbols in one priority band
    ///
    /// The ordered catalog is cut into `TIER_COUNT` contiguous bands of
    /// `ceil(n / TIER_COUNT)` symbols; tier 1 is the top band. Trailing bands
    /// may be short or empty.
    fn tier(&self, level: u8) -> Result<Vec<String>, ConfigError> {
        if !(1..=TIER_COUNT).contains(&level) {
            return Err(ConfigError::InvalidTier(level.into()));
        }

        let entries = self.entries();
        let band = entries.len().div_ceil(TIER_COUNT as usize);
        let start = (level as usize - 1) * band;

        Ok(entries
            .iter()
            .skip(start)
            .take(band)
            .map(|e| e.symbol.clone())
            .collect())
    }
}

/// Catalog file layout:
///
/// ```toml
/// [[symbols]]
/// symbol = "AAPL"
/// name = "Apple Inc."
/// priority = 100
/// ```
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    symbols: Vec<CatalogEntry>,
}

/// Catalog held in memory
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl StaticCatalog {
    /// Build from entries: symbols are trimmed and upper-cased, duplicates
    /// dropped (first wins), then ordered by priority descending.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut entries: Vec<CatalogEntry> = entries
            .into_iter()
            .filter_map(|mut e| {
                e.symbol = e.symbol.trim().to_uppercase();
                if e.symbol.is_empty() || !seen.insert(e.symbol.clone()) {
                    return None;
                }
                Some(e)
            })
            .collect();

        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.symbol.cmp(&b.symbol)));

        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.symbol.clone(), i))
            .collect();

        Self { entries, index }
    }

    /// Parse a catalog from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| ConfigError::Catalog(format!("parse catalog TOML: {e}")))?;
        Ok(Self::from_entries(file.symbols))
    }

    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Catalog(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Default US large-cap catalog
    pub fn builtin() -> Self {
        let entries = [
            ("AAPL", "Apple Inc.", 100),
            ("MSFT", "Microsoft Corporation", 99),
            ("NVDA", "NVIDIA Corporation", 98),
            ("AMZN", "Amazon.com, Inc.", 97),
            ("GOOGL", "Alphabet Inc.", 96),
            ("META", "Meta Platforms, Inc.", 95),
            ("TSLA", "Tesla, Inc.", 94),
            ("AVGO", "Broadcom Inc.", 93),
            ("BRK.B", "Berkshire Hathaway Inc.", 92),
            ("JPM", "JPMorgan Chase & Co.", 91),
            ("LLY", "Eli Lilly and Company", 90),
            ("V", "Visa Inc.", 89),
            ("UNH", "UnitedHealth Group Incorporated", 88),
            ("XOM", "Exxon Mobil Corporation", 87),
            ("MA", "Mastercard Incorporated", 86),
            ("COST", "Costco Wholesale Corporation", 85),
            ("HD", "The Home Depot, Inc.", 84),
            ("PG", "The Procter & Gamble Company", 83),
            ("JNJ", "Johnson & Johnson", 82),
            ("WMT", "Walmart Inc.", 81),
            ("NFLX", "Netflix, Inc.", 80),
            ("ABBV", "AbbVie Inc.", 79),
            ("BAC", "Bank of America Corporation", 78),
            ("CRM", "Salesforce, Inc.", 77),
            ("ORCL", "Oracle Corporation", 76),
            ("AMD", "Advanced Micro Devices, Inc.", 75),
            ("KO", "The Coca-Cola Company", 74),
            ("CVX", "Chevron Corporation", 73),
            ("MRK", "Merck & Co., Inc.", 72),
            ("PEP", "PepsiCo, Inc.", 71),
            ("ADBE", "Adobe Inc.", 70),
            ("TMO", "Thermo Fisher Scientific Inc.", 69),
            ("CSCO", "Cisco Systems, Inc.", 68),
            ("ACN", "Accenture plc", 67),
            ("MCD", "McDonald's Corporation", 66),
            ("ABT", "Abbott Laboratories", 65),
            ("INTC", "Intel Corporation", 64),
            ("DIS", "The Walt Disney Company", 63),
            ("WFC", "Wells Fargo & Company", 62),
            ("QCOM", "QUALCOMM Incorporated", 61),
            ("INTU", "Intuit Inc.", 60),
            ("IBM", "International Business Machines Corporation", 59),
            ("GS", "The Goldman Sachs Group, Inc.", 58),
            ("CAT", "Caterpillar Inc.", 57),
            ("NKE", "NIKE, Inc.", 56),
            ("SPY", "SPDR S&P 500 ETF Trust", 55),
            ("QQQ", "Invesco QQQ Trust", 54),
            ("IWM", "iShares Russell 2000 ETF", 53),
            ("DIA", "SPDR Dow Jones Industrial Average ETF", 52),
            ("PLTR", "Palantir Technologies Inc.", 51),
        ];

        Self::from_entries(
            entries
                .iter()
                .map(|(symbol, name, priority)| CatalogEntry::new(symbol, name, *priority))
                .collect(),
        )
    }
}

impl CatalogProvider for StaticCatalog {
    fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    fn priority_of(&self, symbol: &str) -> i32 {
        self.index
            .get(symbol)
            .map(|&i| self.entries[i].priority)
            .unwrap_or(0)
    }

    fn display_name(&self, symbol: &str) -> Option<String> {
        self.index.get(symbol).map(|&i| self.entries[i].name.clone())
    }
}
