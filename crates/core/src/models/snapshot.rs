use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One broker-reported position, independent of transaction history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSnapshot {
    pub isin: String,
    #[serde(alias = "netSize")]
    pub quantity: f64,
    #[serde(alias = "costBasis", alias = "averageBuyIn")]
    pub cost_basis: Option<f64>,
    #[serde(alias = "currentPrice")]
    pub current_price: Option<f64>,
    pub name: Option<String>,
}

/// "Right now" state of the account as reported by the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSnapshot {
    pub positions: Vec<PositionSnapshot>,
    /// Live cash balance, if the broker reported one
    pub cash: Option<f64>,
    /// Live total account value, if the broker reported one
    #[serde(alias = "totalValue")]
    pub total_value: Option<f64>,
}

impl PortfolioSnapshot {
    /// Ground-truth quantities keyed by upper-cased ISIN. Duplicate rows are summed.
    pub fn ground_truth(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        for position in &self.positions {
            let isin = position.isin.trim().to_uppercase();
            if isin.is_empty() || !position.quantity.is_finite() {
                continue;
            }
            *map.entry(isin).or_insert(0.0) += position.quantity;
        }
        map
    }

    /// Live total: the reported value, else positions at current price plus cash.
    pub fn live_total(&self) -> Option<f64> {
        if let Some(total) = self.total_value.filter(|t| t.is_finite()) {
            return Some(total);
        }
        let mut total = 0.0;
        for position in &self.positions {
            total += position.quantity * position.current_price?;
        }
        if self.positions.is_empty() && self.cash.is_none() {
            return None;
        }
        Some(total + self.cash.unwrap_or(0.0).max(0.0))
    }
}
