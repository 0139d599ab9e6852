use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::models::holdings::HoldingsTimeline;
use crate::models::price::PriceSeries;
use crate::models::report::{Partial, SkippedRecord, Stage};
use crate::models::series::{CashTimeline, InvestedCapitalSeries};
use crate::models::valuation::ValuationPoint;

/// Inputs of one valuation run.
pub struct ValuationInputs<'a> {
    pub holdings: &'a HoldingsTimeline,
    pub prices: &'a BTreeMap<String, PriceSeries>,
    pub invested: &'a InvestedCapitalSeries,
    pub cash: &'a CashTimeline,
    /// Live total reported by the broker; replaces the reconstruction for `as_of`
    pub live_total: Option<f64>,
    pub as_of: NaiveDate,
}

/// Combines holdings × prices + cash into the {date, invested, value} history.
///
/// Computes all the numbers; rendering is someone else's job.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Build the valuation history.
    ///
    /// The date domain is the union of every input date on or after the first
    /// invested-capital date and not after `as_of`. Quantities and prices are
    /// looked up as of each date (most recent known value, never interpolated).
    /// A held instrument without a price on a date is left out of that date's
    /// sum and reported once as skipped.
    pub fn build(&self, inputs: &ValuationInputs<'_>) -> Partial<Vec<ValuationPoint>> {
        let mut result = Partial::new(Vec::new());

        let Some(start) = inputs.invested.first_date() else {
            warn!("no invested capital recorded, valuation history is empty");
            if let Some(total) = inputs.live_total {
                result.value.push(ValuationPoint {
                    date: inputs.as_of,
                    invested: 0.0,
                    value: total,
                });
            }
            return result;
        };

        let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
        dates.extend(inputs.holdings.all_dates());
        dates.extend(inputs.invested.dates());
        dates.extend(inputs.cash.dates());
        for series in inputs.prices.values() {
            dates.extend(series.dates());
        }
        let dates: Vec<NaiveDate> = dates
            .into_iter()
            .filter(|d| *d >= start && *d <= inputs.as_of)
            .collect();

        let mut unpriced: BTreeMap<&str, NaiveDate> = BTreeMap::new();
        for date in dates {
            let mut value = 0.0;
            for (isin, _) in inputs.holdings.iter() {
                let quantity = inputs.holdings.quantity_as_of(isin, date).unwrap_or(0.0);
                if quantity <= 0.0 {
                    continue;
                }
                match inputs.prices.get(isin).and_then(|s| s.price_as_of(date)) {
                    Some(price) => value += quantity * price,
                    None => {
                        unpriced.entry(isin).or_insert(date);
                    }
                }
            }
            value += inputs.cash.value_as_of(date).unwrap_or(0.0).max(0.0);

            result.value.push(ValuationPoint {
                date,
                invested: inputs.invested.value_as_of(date).unwrap_or(0.0),
                value,
            });
        }

        for (isin, first_date) in unpriced {
            debug!(isin, first_date = %first_date, "held without price, excluded from value");
            result.skip(SkippedRecord::new(
                Stage::Valuation,
                isin,
                format!("held without known price from {first_date}"),
            ));
        }

        if let Some(total) = inputs.live_total.filter(|t| t.is_finite()) {
            let invested = inputs.invested.value_as_of(inputs.as_of).unwrap_or(0.0);
            match result.value.last_mut() {
                Some(last) if last.date == inputs.as_of => {
                    info!(reconstructed = last.value, live = total, "overriding today's value with live total");
                    last.value = total;
                }
                _ => result.value.push(ValuationPoint {
                    date: inputs.as_of,
                    invested,
                    value: total,
                }),
            }
        }

        result
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}
