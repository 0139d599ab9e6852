use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One point of the reconstructed portfolio history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub date: NaiveDate,
    /// Cumulative externally-contributed capital
    pub invested: f64,
    /// Holdings × prices + non-negative cash
    pub value: f64,
}

/// Chart-ready performance series derived from the valuation history.
///
/// All vectors have the same length as `dates`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub invested: Vec<f64>,
    /// Cumulative time-weighted return in %, starting at 0
    pub twr: Vec<f64>,
    /// % below the running TWR peak, always ≤ 0
    pub drawdown: Vec<f64>,
}

impl PerformanceSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Headline figures for a performance series. All values in %.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
}

/// A dated cash flow into (+) or out of (−) a simulated benchmark portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Which of the user's flows a benchmark simulation replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowSource {
    /// Deposits and withdrawals (changes of invested capital)
    External,
    /// Buy and sell trades
    Trades,
}
