use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Per-instrument quantity held as of the end of each recorded date.
///
/// Invariants:
/// - dates per instrument are strictly increasing (guaranteed by `BTreeMap`)
/// - quantities are never negative
/// - an instrument has no entry before its first recorded change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldingsTimeline {
    series: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
}

impl HoldingsTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the quantity held by `isin` at the end of `date`. Negative input is clamped to 0.
    pub fn record(&mut self, isin: &str, date: NaiveDate, quantity: f64) {
        self.series
            .entry(isin.to_string())
            .or_default()
            .insert(date, quantity.max(0.0));
    }

    /// The full series of one instrument.
    pub fn series(&self, isin: &str) -> Option<&BTreeMap<NaiveDate, f64>> {
        self.series.get(isin)
    }

    /// Most recent recorded quantity on or before `date`.
    pub fn quantity_as_of(&self, isin: &str, date: NaiveDate) -> Option<f64> {
        self.series
            .get(isin)?
            .range(..=date)
            .next_back()
            .map(|(_, q)| *q)
    }

    /// Latest recorded quantity; 0 for unknown instruments.
    pub fn final_quantity(&self, isin: &str) -> f64 {
        self.series
            .get(isin)
            .and_then(|s| s.values().next_back().copied())
            .unwrap_or(0.0)
    }

    pub fn contains(&self, isin: &str) -> bool {
        self.series.contains_key(isin)
    }

    /// Instrument ids in sorted order.
    pub fn isins(&self) -> impl Iterator<Item = &str> + '_ {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<NaiveDate, f64>)> + '_ {
        self.series.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Earliest date recorded for any instrument.
    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.series
            .values()
            .filter_map(|s| s.keys().next().copied())
            .min()
    }

    /// Union of every recorded date across instruments.
    pub fn all_dates(&self) -> BTreeSet<NaiveDate> {
        self.series
            .values()
            .flat_map(|s| s.keys().copied())
            .collect()
    }

    /// Multiply every historical point of `isin` by `ratio`.
    pub fn scale(&mut self, isin: &str, ratio: f64) {
        if let Some(series) = self.series.get_mut(isin) {
            for quantity in series.values_mut() {
                *quantity = (*quantity * ratio).max(0.0);
            }
        }
    }

    /// Move the whole history of `old` to `new`. Returns false when `old` is unknown.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self.series.remove(old) {
            Some(series) => {
                self.series.insert(new.to_string(), series);
                true
            }
            None => false,
        }
    }

    /// Replace the history of `isin` with a constant quantity at every
    /// date in `dates` on or after `from`.
    pub fn backfill_constant(
        &mut self,
        isin: &str,
        quantity: f64,
        from: NaiveDate,
        dates: &BTreeSet<NaiveDate>,
    ) {
        let mut series: BTreeMap<NaiveDate, f64> = dates
            .range(from..)
            .map(|d| (*d, quantity.max(0.0)))
            .collect();
        series.insert(from, quantity.max(0.0));
        self.series.insert(isin.to_string(), series);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// A correction applied to the reconstructed holdings so that they match
/// the broker's current positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationAdjustment {
    /// Split-like correction: every historical point multiplied by `multiplier`.
    Ratio { isin: String, multiplier: f64 },
    /// History of `old_isin` transplanted to `new_isin`.
    IsinChange {
        old_isin: String,
        new_isin: String,
        quantity: f64,
    },
    /// Untracked transfer-in backfilled as a constant quantity.
    AddPosition {
        isin: String,
        quantity: f64,
        effective_date: NaiveDate,
    },
}

impl ReconciliationAdjustment {
    /// The instrument the adjustment leaves behind in the timeline.
    pub fn isin(&self) -> &str {
        match self {
            ReconciliationAdjustment::Ratio { isin, .. } => isin,
            ReconciliationAdjustment::IsinChange { new_isin, .. } => new_isin,
            ReconciliationAdjustment::AddPosition { isin, .. } => isin,
        }
    }
}

impl std::fmt::Display for ReconciliationAdjustment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconciliationAdjustment::Ratio { isin, multiplier } => {
                write!(f, "ratio {isin} ×{multiplier:.6}")
            }
            ReconciliationAdjustment::IsinChange {
                old_isin,
                new_isin,
                quantity,
            } => write!(f, "isin change {old_isin} → {new_isin} ({quantity})"),
            ReconciliationAdjustment::AddPosition {
                isin,
                quantity,
                effective_date,
            } => write!(f, "add position {isin} {quantity} from {effective_date}"),
        }
    }
}

/// One entry of the append-only adjustment log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub adjustment: ReconciliationAdjustment,
    /// Final reconstructed quantity before the adjustment
    pub computed_quantity: f64,
    /// Broker-reported quantity the adjustment aligned to
    pub ground_truth_quantity: f64,
}

impl AdjustmentRecord {
    pub fn new(
        adjustment: ReconciliationAdjustment,
        computed_quantity: f64,
        ground_truth_quantity: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            adjustment,
            computed_quantity,
            ground_truth_quantity,
        }
    }
}
