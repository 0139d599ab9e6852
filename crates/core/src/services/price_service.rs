use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::instrument::Instrument;
use crate::models::price::{PriceCache, PricePoint};
use crate::providers::registry::PriceProviderRegistry;
use crate::providers::symbols::SymbolResolver;
use crate::services::currency_service::CurrencyService;

/// Days of slack allowed at either end of a cached range (weekends, holidays).
const CACHE_EDGE_TOLERANCE_DAYS: i64 = 4;

/// Fetches external closing prices with caching and graceful degradation.
///
/// Cache strategy:
/// - **Historical dates (< today)**: fetched once, cached forever.
/// - **Today**: refreshed at most once per day.
///
/// Failures (no provider, no listing, provider errors, missing FX rate) come
/// back as errors only when nothing is cached either; callers log them and
/// carry on without the instrument.
pub struct PriceService {
    registry: PriceProviderRegistry,
    resolver: SymbolResolver,
    currency_service: CurrencyService,
    account_currency: String,
}

impl PriceService {
    pub fn new(
        registry: PriceProviderRegistry,
        resolver: SymbolResolver,
        account_currency: &str,
    ) -> Self {
        Self {
            registry,
            resolver,
            currency_service: CurrencyService::new(),
            account_currency: account_currency.to_uppercase(),
        }
    }

    /// Service with no providers: only cached prices are ever returned.
    pub fn offline(account_currency: &str) -> Self {
        Self::new(
            PriceProviderRegistry::new(),
            SymbolResolver::offline(),
            account_currency,
        )
    }

    pub fn registry(&self) -> &PriceProviderRegistry {
        &self.registry
    }

    pub fn account_currency(&self) -> &str {
        &self.account_currency
    }

    /// Names of the providers that can price an instrument class.
    pub fn get_provider_names(&self, instrument: &Instrument) -> Vec<String> {
        self.registry
            .get_providers_for(instrument.class)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Closing prices for `instrument` in the account currency over `[from, to]`.
    ///
    /// 1. Cached range covering both ends → returned without network access
    /// 2. Otherwise resolve the ticker and try each provider for the class in order
    /// 3. Convert from the listing currency, store in `cache`
    ///
    /// Whatever is cached is returned when every fetch attempt fails.
    pub async fn fetch_history(
        &self,
        cache: &mut PriceCache,
        instrument: &Instrument,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let isin = instrument.isin.as_str();
        let currency = self.account_currency.as_str();

        let cached = cache.get_price_range(isin, currency, from, to);
        if self.covers(cache, &cached, isin, from, to, today) {
            debug!(isin, points = cached.len(), "using cached prices");
            return Ok(cached);
        }
        let or_cached = |err: CoreError| {
            if cached.is_empty() {
                Err(err)
            } else {
                debug!(isin, error = %err, "serving stale cached prices");
                Ok(cached.clone())
            }
        };

        let providers = self.registry.get_providers_for(instrument.class);
        if providers.is_empty() {
            debug!(isin, class = %instrument.class, "no provider for instrument class");
            return or_cached(CoreError::NoProvider(instrument.class.to_string()));
        }

        let Some(listing) = self.resolver.resolve(isin).await else {
            warn!(isin, "no ticker known, cannot fetch external prices");
            return or_cached(CoreError::SymbolNotFound(isin.to_string()));
        };

        for provider in providers {
            match provider
                .get_price_range(&listing.ticker, &listing.currency, from, to)
                .await
            {
                Ok(points) => {
                    let points: Vec<PricePoint> = points
                        .into_iter()
                        .filter(|p| p.price.is_finite() && p.price > 0.0)
                        .collect();
                    if points.is_empty() {
                        debug!(isin, provider = provider.name(), "provider returned no prices");
                        continue;
                    }
                    let converted = self
                        .currency_service
                        .convert_points(&self.registry, points, &listing.currency, currency)
                        .await;
                    if converted.is_empty() {
                        continue;
                    }
                    info!(
                        isin,
                        ticker = %listing.ticker,
                        provider = provider.name(),
                        points = converted.len(),
                        "fetched external prices"
                    );
                    cache.set_prices(isin, currency, &converted);
                    cache.mark_fetched(isin, currency, from, today);
                    return Ok(cache.get_price_range(isin, currency, from, to));
                }
                Err(e) => {
                    warn!(isin, provider = provider.name(), error = %e, "price fetch failed");
                }
            }
        }

        or_cached(CoreError::PriceNotAvailable {
            symbol: listing.ticker,
            currency: currency.to_string(),
            period: format!("{from}..{to}"),
        })
    }

    /// Whether cached points satisfy a request without refetching.
    fn covers(
        &self,
        cache: &PriceCache,
        cached: &[PricePoint],
        isin: &str,
        from: NaiveDate,
        to: NaiveDate,
        today: NaiveDate,
    ) -> bool {
        let (Some(first), Some(last)) = (cached.first(), cached.last()) else {
            return false;
        };
        // A first close after `from` is fine once a provider was asked from there:
        // the instrument simply did not trade earlier.
        let head_known = (first.date - from).num_days() <= CACHE_EDGE_TOLERANCE_DAYS
            || cache
                .fetched_from(isin, &self.account_currency)
                .is_some_and(|d| d <= from);
        if !head_known {
            return false;
        }
        if (to - last.date).num_days() <= CACHE_EDGE_TOLERANCE_DAYS {
            return true;
        }
        // The tail is only missing because the range reaches today: refresh once a day.
        to >= today
            && cache
                .last_updated(isin, &self.account_currency)
                .is_some_and(|d| d == today)
    }
}
