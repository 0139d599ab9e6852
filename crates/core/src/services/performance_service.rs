use chrono::NaiveDate;

use crate::models::valuation::{PerformanceMetrics, PerformanceSeries, ValuationPoint};

/// Trading days per year used for annualisation.
const TRADING_DAYS: f64 = 252.0;

/// Time-weighted return, drawdown and summary metrics.
///
/// Stateless: every function is a pure transform of its inputs.
pub struct PerformanceService {
    period_floor: f64,
    period_cap: f64,
}

impl PerformanceService {
    /// `period_floor`/`period_cap` clamp each single-period return (fractions, e.g. -0.5 and 1.0).
    pub fn new(period_floor: f64, period_cap: f64) -> Self {
        Self {
            period_floor,
            period_cap,
        }
    }

    /// Cumulative TWR in %, starting at 0.
    ///
    /// Start-of-period cash-flow convention:
    /// `r[t] = value[t] / (value[t-1] + flow[t]) − 1` with `flow[t] = invested[t] − invested[t-1]`.
    /// Each `r[t]` is clamped to absorb data glitches. Periods whose adjusted
    /// start value is not positive contribute nothing.
    pub fn calculate_twr(&self, values: &[f64], invested: &[f64]) -> Vec<f64> {
        let n = values.len().min(invested.len());
        if n == 0 {
            return Vec::new();
        }

        let mut twr = Vec::with_capacity(n);
        twr.push(0.0);
        let mut factor = 1.0;
        for t in 1..n {
            let flow = invested[t] - invested[t - 1];
            let base = values[t - 1] + flow;
            if base > 0.0 && base.is_finite() && values[t].is_finite() {
                let period = (values[t] / base - 1.0).clamp(self.period_floor, self.period_cap);
                factor *= 1.0 + period;
            }
            twr.push((factor - 1.0) * 100.0);
        }
        twr
    }

    /// Drawdown in % from the running peak of the TWR equity index. Always ≤ 0.
    pub fn calculate_drawdown(&self, twr: &[f64]) -> Vec<f64> {
        let mut peak = f64::NEG_INFINITY;
        twr.iter()
            .map(|t| {
                let equity = 1.0 + t / 100.0;
                peak = peak.max(equity);
                if peak > 0.0 && equity.is_finite() {
                    ((equity - peak) / peak * 100.0).min(0.0)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Re-anchor a slice of a cumulative TWR series to 0% at its first point.
    ///
    /// A first point at or below −100% cannot be re-anchored and is returned unchanged.
    pub fn rebase(&self, twr: &[f64]) -> Vec<f64> {
        let Some(first) = twr.first() else {
            return Vec::new();
        };
        let start = 1.0 + first / 100.0;
        if start <= 0.0 {
            return twr.to_vec();
        }
        twr.iter()
            .map(|t| ((1.0 + t / 100.0) / start - 1.0) * 100.0)
            .collect()
    }

    /// Forward-fill a valuation history to one point per calendar day.
    pub fn fill_daily(&self, points: &[ValuationPoint]) -> Vec<ValuationPoint> {
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.date);
        sorted.dedup_by(|later, earlier| {
            if later.date == earlier.date {
                *earlier = later.clone();
                true
            } else {
                false
            }
        });

        let mut filled: Vec<ValuationPoint> = Vec::with_capacity(sorted.len());
        for point in sorted {
            if let Some(prev) = filled.last().cloned() {
                let mut date = prev.date.succ_opt();
                while let Some(d) = date.filter(|d| *d < point.date) {
                    filled.push(ValuationPoint { date: d, ..prev.clone() });
                    date = d.succ_opt();
                }
            }
            filled.push(point);
        }
        filled
    }

    /// Build the chart-ready performance series from a valuation history.
    pub fn build_series(&self, points: &[ValuationPoint], daily_gap_fill: bool) -> PerformanceSeries {
        let points = if daily_gap_fill {
            self.fill_daily(points)
        } else {
            let mut sorted = points.to_vec();
            sorted.sort_by_key(|p| p.date);
            sorted
        };

        let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let invested: Vec<f64> = points.iter().map(|p| p.invested).collect();
        let twr = self.calculate_twr(&values, &invested);
        let drawdown = self.calculate_drawdown(&twr);

        PerformanceSeries {
            dates,
            values,
            invested,
            twr,
            drawdown,
        }
    }

    /// Headline metrics of a performance series.
    pub fn metrics(&self, series: &PerformanceSeries) -> PerformanceMetrics {
        if series.len() < 2 {
            return PerformanceMetrics::default();
        }

        let total_return = series.twr.last().copied().unwrap_or(0.0);
        let max_drawdown = series.drawdown.iter().copied().fold(0.0, f64::min);

        let periods = (series.len() - 1) as f64;
        let annualized_return = if total_return > -100.0 {
            ((1.0 + total_return / 100.0).powf(TRADING_DAYS / periods) - 1.0) * 100.0
        } else {
            0.0
        };

        let returns: Vec<f64> = series
            .values
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .filter(|r| r.is_finite())
            .collect();
        let volatility = if returns.len() > 1 {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance =
                returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
            variance.sqrt() * TRADING_DAYS.sqrt() * 100.0
        } else {
            0.0
        };

        PerformanceMetrics {
            total_return,
            annualized_return,
            max_drawdown,
            volatility,
        }
    }
}

impl Default for PerformanceService {
    fn default() -> Self {
        Self::new(-0.5, 1.0)
    }
}
