use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single price data point (date → price).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Where a price series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Derived from the instrument's own execution prices (`|amount| / shares`)
    Transaction,
    /// Closing prices from an external provider
    External,
}

/// Price history of one instrument on the common date grid, forward-filled.
///
/// Never extends before the first known price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub source: PriceSource,
    /// Sorted by date, no duplicates
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(source: PriceSource, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { source, points }
    }

    /// Most recent price on or before `date`; `None` before the first point.
    pub fn price_as_of(&self, date: NaiveDate) -> Option<f64> {
        match self.points.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => Some(self.points[idx].price),
            Err(0) => None,
            Err(idx) => Some(self.points[idx - 1].price),
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn first_price(&self) -> Option<f64> {
        self.points.first().map(|p| p.price)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Local cache of external closing prices, keyed by `ISIN/CURRENCY`.
///
/// Persisted inside the user cache so that:
/// - Historical closes (date < today) are fetched ONCE and never re-fetched.
/// - Reconstruction works offline with cached data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceCache {
    /// `ISIN/CURRENCY` → sorted Vec of PricePoints
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<PricePoint>>,

    /// Date each key was last refreshed from a provider
    #[serde(default)]
    pub last_updated: BTreeMap<String, NaiveDate>,

    /// Earliest start date a provider has been asked for, per key
    #[serde(default)]
    pub fetched_from: BTreeMap<String, NaiveDate>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(isin: &str, currency: &str) -> String {
        format!("{}/{}", isin.to_uppercase(), currency.to_uppercase())
    }

    /// Get a cached price for an exact date. Uses binary search (O(log n)).
    pub fn get_price(&self, isin: &str, currency: &str, date: NaiveDate) -> Option<f64> {
        let entries = self.entries.get(&Self::key(isin, currency))?;
        entries
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| entries[idx].price)
    }

    /// Insert or update a price point, keeping date order.
    pub fn set_price(&mut self, isin: &str, currency: &str, date: NaiveDate, price: f64) {
        let entries = self.entries.entry(Self::key(isin, currency)).or_default();
        match entries.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => entries[idx].price = price,
            Err(idx) => entries.insert(idx, PricePoint { date, price }),
        }
    }

    pub fn set_prices(&mut self, isin: &str, currency: &str, points: &[PricePoint]) {
        for point in points {
            self.set_price(isin, currency, point.date, point.price);
        }
    }

    /// All cached points for a key within `[from, to]`.
    pub fn get_price_range(
        &self,
        isin: &str,
        currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<PricePoint> {
        self.entries
            .get(&Self::key(isin, currency))
            .map(|entries| {
                let start = entries
                    .binary_search_by_key(&from, |p| p.date)
                    .unwrap_or_else(|pos| pos);
                let end = entries
                    .binary_search_by_key(&to, |p| p.date)
                    .map(|pos| pos + 1)
                    .unwrap_or_else(|pos| pos);
                if start >= end {
                    Vec::new()
                } else {
                    entries[start..end].to_vec()
                }
            })
            .unwrap_or_default()
    }

    pub fn mark_updated(&mut self, isin: &str, currency: &str, today: NaiveDate) {
        self.last_updated.insert(Self::key(isin, currency), today);
    }

    /// Record a successful provider fetch starting at `from`.
    pub fn mark_fetched(&mut self, isin: &str, currency: &str, from: NaiveDate, today: NaiveDate) {
        self.fetched_from
            .entry(Self::key(isin, currency))
            .and_modify(|d| *d = (*d).min(from))
            .or_insert(from);
        self.mark_updated(isin, currency, today);
    }

    pub fn fetched_from(&self, isin: &str, currency: &str) -> Option<NaiveDate> {
        self.fetched_from.get(&Self::key(isin, currency)).copied()
    }

    pub fn last_updated(&self, isin: &str, currency: &str) -> Option<NaiveDate> {
        self.last_updated.get(&Self::key(isin, currency)).copied()
    }

    /// Total number of cached points across all keys.
    pub fn total_entries(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_updated.clear();
        self.fetched_from.clear();
    }
}
