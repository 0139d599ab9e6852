use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::instrument::InstrumentClass;
use crate::models::price::PricePoint;
use super::traits::PriceProvider;

const BASE_URL: &str = "https://api.frankfurter.dev/v1";
const PROVIDER: &str = "Frankfurter";

/// ECB reference rates via the Frankfurter API.
///
/// `symbol` is the base currency and `currency` the quote currency, so a
/// returned "price" is the number of `currency` units per one `symbol` unit.
/// Rates exist for ECB working days only; `CurrencyService` carries them forward.
pub struct FrankfurterProvider {
    client: Client,
}

/// `/{from}..{to}` body: date → (currency → rate).
#[derive(Deserialize)]
struct RangeBody {
    #[serde(default)]
    rates: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl RangeBody {
    fn into_points(self, quote: &str) -> Vec<PricePoint> {
        self.rates
            .into_iter()
            .filter_map(|(date, mut by_currency)| {
                by_currency
                    .remove(quote)
                    .filter(|rate| rate.is_finite() && *rate > 0.0)
                    .map(|price| PricePoint { date, price })
            })
            .collect()
    }
}

impl FrankfurterProvider {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    fn range_url(base: &str, quote: &str, from: NaiveDate, to: NaiveDate) -> String {
        format!(
            "{BASE_URL}/{}..{}?base={base}&symbols={quote}",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        )
    }
}

impl Default for FrankfurterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for FrankfurterProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn supported_classes(&self) -> Vec<InstrumentClass> {
        vec![InstrumentClass::Fiat]
    }

    async fn get_price_range(
        &self,
        symbol: &str,
        currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let base = symbol.to_uppercase();
        let quote = currency.to_uppercase();
        if from > to {
            return Ok(Vec::new());
        }
        if base == quote {
            // Identity rate, no request needed.
            return Ok(from
                .iter_days()
                .take_while(|d| *d <= to)
                .map(|date| PricePoint { date, price: 1.0 })
                .collect());
        }

        let body: RangeBody = self
            .client
            .get(Self::range_url(&base, &quote, from, to))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("unreadable {base}/{quote} rates: {e}"),
            })?;
        Ok(body.into_points(&quote))
    }
}
