use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::event::{ClassifiedEvent, EventKind};
use crate::models::price::PriceSeries;
use crate::models::series::InvestedCapitalSeries;
use crate::models::valuation::{CashFlow, FlowSource, ValuationPoint};

/// Replays the user's own cash flows into a benchmark instrument.
///
/// Answers "what if every euro had gone into X instead".
pub struct BenchmarkService;

impl BenchmarkService {
    pub fn new() -> Self {
        Self
    }

    /// Dated flows for a simulation.
    ///
    /// `External` uses day-over-day changes of invested capital; `Trades` uses
    /// buy (+) and sell (−) amounts, aggregated per day.
    pub fn flows(
        &self,
        source: FlowSource,
        events: &[ClassifiedEvent],
        invested: &InvestedCapitalSeries,
    ) -> Vec<CashFlow> {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        match source {
            FlowSource::External => {
                let mut previous = 0.0;
                for (date, total) in invested.iter() {
                    *by_date.entry(date).or_default() += total - previous;
                    previous = total;
                }
            }
            FlowSource::Trades => {
                for event in events {
                    let amount = match event.kind {
                        EventKind::Buy => event.amount.abs(),
                        EventKind::Sell => -event.amount.abs(),
                        _ => continue,
                    };
                    *by_date.entry(event.date()).or_default() += amount;
                }
            }
        }
        by_date
            .into_iter()
            .filter(|(_, amount)| amount.abs() > f64::EPSILON)
            .map(|(date, amount)| CashFlow { date, amount })
            .collect()
    }

    /// Value of the simulated benchmark position on each of `dates`.
    ///
    /// Inflows buy `amount / price` units at the as-of price (or the first
    /// known price when the flow predates the series). Outflows sell the
    /// proportional share `min(1, |amount| / invested)` of units.
    pub fn simulate(
        &self,
        prices: &PriceSeries,
        flows: &[CashFlow],
        dates: &[NaiveDate],
    ) -> Vec<ValuationPoint> {
        let mut flows: Vec<&CashFlow> = flows.iter().collect();
        flows.sort_by_key(|f| f.date);
        let mut pending = flows.into_iter().peekable();

        let mut units = 0.0;
        let mut invested: f64 = 0.0;
        let mut points = Vec::with_capacity(dates.len());

        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();

        for date in dates {
            while let Some(flow) = pending.next_if(|f| f.date <= date) {
                if flow.amount > 0.0 {
                    let price = prices
                        .price_as_of(flow.date)
                        .or_else(|| prices.first_price());
                    if let Some(price) = price.filter(|p| *p > 0.0) {
                        units += flow.amount / price;
                    }
                    invested += flow.amount;
                } else if flow.amount < 0.0 && invested > 0.0 {
                    let share = (flow.amount.abs() / invested).min(1.0);
                    units -= units * share;
                    invested = (invested - flow.amount.abs()).max(0.0);
                }
            }

            let value = match prices.price_as_of(date) {
                Some(price) => units * price,
                None => invested,
            };
            points.push(ValuationPoint {
                date,
                invested,
                value,
            });
        }
        points
    }
}

impl Default for BenchmarkService {
    fn default() -> Self {
        Self::new()
    }
}
