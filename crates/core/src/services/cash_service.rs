use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::models::event::ClassifiedEvent;
use crate::models::series::CashTimeline;

/// Gap (in account currency) below which reconstructed and reported cash are considered equal.
const CASH_GAP_TOLERANCE: f64 = 0.01;

/// Builds the running cash balance from cash-moving events.
pub struct CashService;

impl CashService {
    pub fn new() -> Self {
        Self
    }

    /// Accumulate per-date cash deltas and take the cumulative sum over sorted dates.
    ///
    /// Deposits, dividends, interest and sale proceeds add; withdrawals,
    /// purchases and fees subtract; tax keeps the broker's sign.
    pub fn build(&self, events: &[ClassifiedEvent]) -> CashTimeline {
        let mut deltas: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for event in events {
            if let Some(delta) = event.cash_delta() {
                *deltas.entry(event.date()).or_insert(0.0) += delta;
            }
        }
        CashTimeline::from_deltas(&deltas)
    }

    /// Compare the final reconstructed balance with the broker's live cash.
    ///
    /// Returns `reconstructed − reported`. The gap is attributed to untracked
    /// fees and never corrected.
    pub fn compare_with_reported(&self, cash: &CashTimeline, reported: Option<f64>) -> Option<f64> {
        let reported = reported?;
        let reconstructed = cash.last_value().unwrap_or(0.0);
        let gap = reconstructed - reported;
        if gap.abs() > CASH_GAP_TOLERANCE {
            warn!(reconstructed, reported, gap, "cash timeline differs from reported balance");
        } else {
            info!(reconstructed, reported, "cash timeline matches reported balance");
        }
        Some(gap)
    }
}

impl Default for CashService {
    fn default() -> Self {
        Self::new()
    }
}
