use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::models::event::{ClassifiedEvent, EventKind};
use crate::models::instrument::{Instrument, InstrumentClass};
use crate::models::price::{PriceCache, PricePoint, PriceSeries, PriceSource};
use crate::models::report::{Partial, SkippedRecord, Stage};
use crate::services::price_service::PriceService;

/// Per-instrument price series assembled for valuation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    pub series: BTreeMap<String, PriceSeries>,
    /// Instruments with no transaction-derived price: candidates for the external fallback
    pub missing: Vec<Instrument>,
    /// Shared grid the series are aligned to
    pub grid: BTreeSet<NaiveDate>,
}

impl PriceHistory {
    pub fn count_by_source(&self, source: PriceSource) -> usize {
        self.series.values().filter(|s| s.source == source).count()
    }
}

/// Derives per-instrument price series, primarily from the user's own
/// executions, and aligns them on a weekly + transaction-date grid.
pub struct PriceHistoryService {
    step_days: u32,
}

impl PriceHistoryService {
    pub fn new(step_days: u32) -> Self {
        Self {
            step_days: step_days.max(1),
        }
    }

    /// Execution prices (`|amount| / shares`) per instrument and date.
    ///
    /// Bonds booked without shares are priced at 1.0 per nominal unit, matching
    /// the nominal quantity used by the holdings builder. When several trades
    /// fall on one day, the latest one wins.
    pub fn transaction_prices(
        &self,
        events: &[ClassifiedEvent],
    ) -> BTreeMap<String, BTreeMap<NaiveDate, f64>> {
        let mut trades: Vec<&ClassifiedEvent> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Buy | EventKind::Sell))
            .filter(|e| e.instrument.is_some())
            .collect();
        trades.sort_by_key(|e| e.timestamp);

        let mut prices: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        for event in trades {
            let Some(instrument) = event.instrument.as_ref() else {
                continue;
            };
            let amount = event.amount.abs();
            if amount <= 0.0 {
                continue;
            }
            let price = match event.shares {
                Some(shares) if shares > 0.0 => amount / shares,
                None if instrument.class == InstrumentClass::Bond => 1.0,
                _ => continue,
            };
            if price.is_finite() && price > 0.0 {
                prices
                    .entry(instrument.isin.clone())
                    .or_default()
                    .insert(event.date(), price);
            }
        }
        prices
    }

    /// Regular grid every `step_days` from `start` to `end`, plus `extra` dates and `end`.
    pub fn grid(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        extra: impl IntoIterator<Item = NaiveDate>,
    ) -> BTreeSet<NaiveDate> {
        let mut grid = BTreeSet::new();
        if start > end {
            return grid;
        }
        let step = Duration::days(i64::from(self.step_days));
        let mut date = start;
        while date <= end {
            grid.insert(date);
            date += step;
        }
        grid.insert(end);
        grid.extend(extra.into_iter().filter(|d| *d >= start && *d <= end));
        grid
    }

    /// Carry the last known price forward onto every grid date.
    ///
    /// Known points are kept as-is; grid dates before the first known point get nothing.
    pub fn forward_fill(
        &self,
        source: PriceSource,
        known: &BTreeMap<NaiveDate, f64>,
        grid: &BTreeSet<NaiveDate>,
    ) -> PriceSeries {
        let mut points: BTreeMap<NaiveDate, f64> = known.clone();
        for date in grid {
            if points.contains_key(date) {
                continue;
            }
            if let Some((_, price)) = known.range(..=*date).next_back() {
                points.insert(*date, *price);
            }
        }
        PriceSeries::new(
            source,
            points
                .into_iter()
                .map(|(date, price)| PricePoint { date, price })
                .collect(),
        )
    }

    /// Assemble transaction-derived series for every instrument in `events` or `positions`.
    ///
    /// Instruments without any execution price are listed in `missing`.
    pub fn build(
        &self,
        events: &[ClassifiedEvent],
        positions: &[Instrument],
        as_of: NaiveDate,
    ) -> Partial<PriceHistory> {
        let known = self.transaction_prices(events);

        let mut instruments: BTreeMap<String, Instrument> = BTreeMap::new();
        for instrument in events.iter().filter_map(|e| e.instrument.as_ref()) {
            instruments
                .entry(instrument.isin.clone())
                .or_insert_with(|| instrument.clone());
        }
        for instrument in positions {
            instruments
                .entry(instrument.isin.clone())
                .or_insert_with(|| instrument.clone());
        }

        let event_dates: BTreeSet<NaiveDate> = events.iter().map(|e| e.date()).collect();
        let grid = match event_dates.first() {
            Some(start) => self.grid(*start, as_of, event_dates.iter().copied()),
            None => BTreeSet::from([as_of]),
        };

        let mut result = Partial::new(PriceHistory {
            grid: grid.clone(),
            ..PriceHistory::default()
        });
        for (isin, instrument) in instruments {
            match known.get(&isin) {
                Some(points) if !points.is_empty() => {
                    let series = self.forward_fill(PriceSource::Transaction, points, &grid);
                    result.value.series.insert(isin, series);
                }
                _ => {
                    debug!(isin = %isin, "no execution prices, needs external fallback");
                    result.value.missing.push(instrument);
                }
            }
        }
        result
    }

    /// Fill `missing` instruments from the external provider, on the same grid.
    ///
    /// Instruments the provider cannot price stay unpriced and are reported as skipped.
    pub async fn fill_from_external(
        &self,
        history: &mut Partial<PriceHistory>,
        price_service: &PriceService,
        cache: &mut PriceCache,
        from_dates: &BTreeMap<String, NaiveDate>,
        as_of: NaiveDate,
        today: NaiveDate,
    ) {
        let missing = std::mem::take(&mut history.value.missing);
        let default_from = history.value.grid.first().copied().unwrap_or(as_of);

        for instrument in missing {
            let from = from_dates
                .get(&instrument.isin)
                .copied()
                .unwrap_or(default_from)
                .min(as_of);
            let fetched = match price_service
                .fetch_history(cache, &instrument, from, as_of, today)
                .await
            {
                Ok(points) if !points.is_empty() => points,
                outcome => {
                    let reason = match outcome {
                        Err(e) => format!("no transaction or external price available: {e}"),
                        Ok(_) => "no transaction or external price available".to_string(),
                    };
                    history.skip(SkippedRecord::new(Stage::Prices, instrument.isin.clone(), reason));
                    history.value.missing.push(instrument);
                    continue;
                }
            };

            let known: BTreeMap<NaiveDate, f64> =
                fetched.iter().map(|p| (p.date, p.price)).collect();
            let series = self.forward_fill(PriceSource::External, &known, &history.value.grid);
            info!(isin = %instrument.isin, points = series.points.len(), "priced from external source");
            history.value.series.insert(instrument.isin.clone(), series);
        }
    }
}

impl Default for PriceHistoryService {
    fn default() -> Self {
        Self::new(7)
    }
}
