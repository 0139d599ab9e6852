use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::instrument::InstrumentClass;
use crate::models::price::PricePoint;

/// Trait abstraction for external price data providers.
///
/// Each API (Yahoo Finance, Frankfurter) implements this trait. If an API
/// stops working or changes, only that one implementation is replaced.
/// Callers treat every error as "no data" and degrade; a provider failure
/// never aborts a reconstruction.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Which instrument classes this provider can price.
    fn supported_classes(&self) -> Vec<InstrumentClass>;

    /// Daily closes for a date range (inclusive), sorted by date.
    async fn get_price_range(
        &self,
        symbol: &str,
        currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError>;
}
