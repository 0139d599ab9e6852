use chrono::NaiveDate;
use tracing::warn;

use crate::models::instrument::InstrumentClass;
use crate::models::price::{PricePoint, PriceSeries, PriceSource};
use crate::providers::registry::PriceProviderRegistry;

/// Converts foreign-currency quotes into the account currency.
///
/// Rates come from the registry's `Fiat` providers (Frankfurter) and are
/// applied as-of each quote date. Quotes with no rate on or before their
/// date are dropped rather than guessed.
pub struct CurrencyService;

impl CurrencyService {
    pub fn new() -> Self {
        Self
    }

    /// Fetch `from → to` rates covering `[start, end]`. `None` when no provider delivers.
    pub async fn fetch_rates(
        &self,
        registry: &PriceProviderRegistry,
        from_currency: &str,
        to_currency: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Vec<PricePoint>> {
        let from = from_currency.to_uppercase();
        let to = to_currency.to_uppercase();

        for provider in registry.get_providers_for(InstrumentClass::Fiat) {
            // Rates are only published on working days: look back a few days.
            let lookback = start - chrono::Duration::days(7);
            match provider.get_price_range(&from, &to, lookback, end).await {
                Ok(points) if !points.is_empty() => return Some(points),
                Ok(_) => {}
                Err(e) => {
                    warn!(provider = provider.name(), pair = %format!("{from}/{to}"), error = %e, "FX fetch failed");
                }
            }
        }
        None
    }

    /// Multiply each quote by the as-of rate. Quotes with no rate yet are dropped.
    pub fn apply_rates(&self, quotes: &[PricePoint], rates: &[PricePoint]) -> Vec<PricePoint> {
        let rates = PriceSeries::new(PriceSource::External, rates.to_vec());
        quotes
            .iter()
            .filter_map(|q| {
                let rate = rates.price_as_of(q.date)?;
                Some(PricePoint {
                    date: q.date,
                    price: q.price * rate,
                })
            })
            .collect()
    }

    /// Convert quotes from `from_currency` to `to_currency`.
    ///
    /// Same currency passes through; a missing rate series yields an empty result.
    pub async fn convert_points(
        &self,
        registry: &PriceProviderRegistry,
        quotes: Vec<PricePoint>,
        from_currency: &str,
        to_currency: &str,
    ) -> Vec<PricePoint> {
        if from_currency.eq_ignore_ascii_case(to_currency) || quotes.is_empty() {
            return quotes;
        }
        let (Some(start), Some(end)) = (quotes.first().map(|p| p.date), quotes.last().map(|p| p.date))
        else {
            return quotes;
        };

        match self
            .fetch_rates(registry, from_currency, to_currency, start, end)
            .await
        {
            Some(rates) => self.apply_rates(&quotes, &rates),
            None => {
                warn!(
                    from = from_currency,
                    to = to_currency,
                    dropped = quotes.len(),
                    "no FX rates available, dropping quotes"
                );
                Vec::new()
            }
        }
    }
}

impl Default for CurrencyService {
    fn default() -> Self {
        Self::new()
    }
}
