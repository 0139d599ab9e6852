use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sparse, date-ordered scalar series (date → value as of end of that date).
///
/// Used for the cash timeline and the invested-capital series. Lookups
/// between recorded dates return the most recent earlier value; nothing is
/// interpolated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateSeries {
    points: BTreeMap<NaiveDate, f64>,
}

/// Running cash balance per date.
pub type CashTimeline = DateSeries;

/// Running externally-contributed capital per date.
pub type InvestedCapitalSeries = DateSeries;

impl DateSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cumulative series from per-date deltas.
    pub fn from_deltas(deltas: &BTreeMap<NaiveDate, f64>) -> Self {
        let mut running = 0.0;
        let points = deltas
            .iter()
            .map(|(date, delta)| {
                running += delta;
                (*date, running)
            })
            .collect();
        Self { points }
    }

    pub fn insert(&mut self, date: NaiveDate, value: f64) {
        self.points.insert(date, value);
    }

    /// Value recorded exactly on `date`.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).copied()
    }

    /// Most recent value on or before `date`.
    pub fn value_as_of(&self, date: NaiveDate) -> Option<f64> {
        self.points.range(..=date).next_back().map(|(_, v)| *v)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.keys().next_back().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.values().next_back().copied()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points.iter().map(|(d, v)| (*d, *v))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
