use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::event::ClassifiedEvent;
use crate::models::series::InvestedCapitalSeries;

/// Builds cumulative externally-contributed capital.
///
/// Only deposits and withdrawals count. Trades, dividends, interest and tax
/// are returns or internal movements. Legacy person-to-person records matched
/// by the name heuristic are left out here, even though they do move cash.
pub struct InvestedService;

impl InvestedService {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, events: &[ClassifiedEvent]) -> InvestedCapitalSeries {
        let mut deltas: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for event in events {
            if let Some(delta) = event.capital_delta() {
                *deltas.entry(event.date()).or_insert(0.0) += delta;
            }
        }
        InvestedCapitalSeries::from_deltas(&deltas)
    }
}

impl Default for InvestedService {
    fn default() -> Self {
        Self::new()
    }
}
