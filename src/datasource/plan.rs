//! Trade plan artifact and its derived summary.
//!
//! The payload is opaque to the engine; only a handful of well-known fields are
//! read to build the summary/description pair and the reference price.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Computed trade plan for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub payload: Value,
    pub reference_price: Option<Decimal>,
    pub generated_at: DateTime<Utc>,
}

/// Summary/description pair stored alongside the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub summary: String,
    pub description: String,
}

impl TradePlan {
    /// Wrap a provider payload, picking up `currentPrice` if present
    pub fn new(symbol: impl Into<String>, payload: Value) -> Self {
        let reference_price = first_number(&payload, &["currentPrice", "current_price", "price"])
            .and_then(Decimal::from_f64)
            .map(|p| p.round_dp(6));

        Self {
            symbol: symbol.into(),
            payload,
            reference_price,
            generated_at: Utc::now(),
        }
    }

    /// Derive the summary/description pair. Pure: same payload, same text.
    pub fn summarize(&self) -> PlanSummary {
        let bias = first_str(&self.payload, &["bias", "direction", "side"]);
        let timeframe = first_str(&self.payload, &["timeframe", "horizon"]);
        let entry = first_number(&self.payload, &["entry", "entryPrice", "entry_price"]);
        let stop = first_number(&self.payload, &["stopLoss", "stop_loss", "stop"]);
        let target = first_number(&self.payload, &["target", "takeProfit", "take_profit"]);

        let mut parts = Vec::new();
        if let Some(bias) = bias {
            parts.push(format!("{} bias", bias.to_lowercase()));
        }
        if let Some(entry) = entry {
            parts.push(format!("entry {:.2}", entry));
        }
        if let Some(stop) = stop {
            parts.push(format!("stop {:.2}", stop));
        }
        if let Some(target) = target {
            parts.push(format!("target {:.2}", target));
        }

        let summary = if parts.is_empty() {
            format!("{}: trade plan available", self.symbol)
        } else {
            format!("{}: {}", self.symbol, parts.join(", "))
        };

        let mut description = format!("Trade plan for {}", self.symbol);
        match (bias, timeframe) {
            (Some(b), Some(t)) => description.push_str(&format!(
                " with a {} bias over a {} horizon.",
                b.to_lowercase(),
                t.to_lowercase()
            )),
            (Some(b), None) => description.push_str(&format!(" with a {} bias.", b.to_lowercase())),
            _ => description.push('.'),
        }
        if let (Some(entry), Some(stop), Some(target)) = (entry, stop, target) {
            description.push_str(&format!(
                " Entry near {:.2}, stop at {:.2}, target {:.2}.",
                entry, stop, target
            ));
            if let Some(rr) = risk_reward(entry, stop, target) {
                description.push_str(&format!(" Risk/reward {:.2}.", rr));
            }
        }

        PlanSummary {
            summary,
            description,
        }
    }
}

fn risk_reward(entry: f64, stop: f64, target: f64) -> Option<f64> {
    let risk = (entry - stop).abs();
    if risk == 0.0 {
        return None;
    }
    Some((target - entry).abs() / risk)
}

fn first_str<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

// Accepts numbers and numeric strings
fn first_number(payload: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match payload.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
