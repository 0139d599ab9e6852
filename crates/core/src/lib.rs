pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;
pub mod sync;

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use errors::CoreError;
use models::{
    cache::UserCache,
    event::{ClassifiedEvent, Confidence},
    holdings::{AdjustmentRecord, HoldingsTimeline},
    instrument::Instrument,
    price::{PriceSeries, PriceSource},
    report::{Partial, SyncReport, ValidationSummary},
    settings::Settings,
    snapshot::PortfolioSnapshot,
    transaction::RawTransaction,
    valuation::{FlowSource, PerformanceSeries, ValuationPoint},
};
use providers::{registry::PriceProviderRegistry, symbols::SymbolResolver};
use services::{
    benchmark_service::BenchmarkService,
    cash_service::CashService,
    classifier_service::{ClassifierService, UNCLASSIFIED_REASON},
    holdings_service::HoldingsService,
    invested_service::InvestedService,
    performance_service::PerformanceService,
    price_history_service::PriceHistoryService,
    price_service::PriceService,
    reconciliation_service::ReconciliationService,
    valuation_service::{ValuationInputs, ValuationService},
};
use storage::cache_store::CacheStore;
use sync::{
    connection::BrokerConnection,
    timeline::{merge_transactions, TimelineFetcher},
};

/// Main entry point of the portfolio history core.
///
/// Holds one user's cached broker data and rebuilds the whole valuation
/// history from it on every [`recalculate`](Self::recalculate).
#[must_use]
pub struct PortfolioHistory {
    cache: UserCache,
    settings: Settings,
    store: Option<CacheStore>,
    price_service: PriceService,
    classifier: ClassifierService,
}

impl std::fmt::Debug for PortfolioHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioHistory")
            .field("user_id", &self.cache.user_id)
            .field("transactions", &self.cache.transactions.len())
            .field("points", &self.cache.history.len())
            .field("cached_prices", &self.cache.price_cache.total_entries())
            .field("providers", &self.price_service.registry().len())
            .finish()
    }
}

impl PortfolioHistory {
    /// Empty history for `user_id`, not backed by a cache directory.
    pub fn new(user_id: impl Into<String>, settings: Settings) -> Result<Self, CoreError> {
        settings.validate()?;
        Ok(Self::build(UserCache::new(user_id), settings, None))
    }

    /// Load `user_id`'s cache from `store`, or start empty if none exists.
    /// Every recalculation is persisted back to `store`.
    pub fn open(store: CacheStore, user_id: &str, settings: Settings) -> Result<Self, CoreError> {
        settings.validate()?;
        let cache = store.load(user_id)?.unwrap_or_else(|| UserCache::new(user_id));
        Ok(Self::build(cache, settings, Some(store)))
    }

    fn build(cache: UserCache, settings: Settings, store: Option<CacheStore>) -> Self {
        let resolver = SymbolResolver::new(settings.api_keys.get("openfigi").cloned());
        let price_service = PriceService::new(
            PriceProviderRegistry::new_with_defaults(),
            resolver,
            &settings.currency(),
        );
        let classifier = ClassifierService::new(settings.vocabulary.clone());
        Self {
            cache,
            settings,
            store,
            price_service,
            classifier,
        }
    }

    /// Replace the external price stack (custom providers, offline resolver, mocks).
    pub fn with_registry(mut self, registry: PriceProviderRegistry, resolver: SymbolResolver) -> Self {
        self.price_service = PriceService::new(registry, resolver, &self.settings.currency());
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn user_id(&self) -> &str {
        &self.cache.user_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Raw timeline, newest first.
    #[must_use]
    pub fn transactions(&self) -> &[RawTransaction] {
        &self.cache.transactions
    }

    #[must_use]
    pub fn history(&self) -> &[ValuationPoint] {
        &self.cache.history
    }

    #[must_use]
    pub fn performance(&self) -> Option<&PerformanceSeries> {
        self.cache.performance.as_ref()
    }

    #[must_use]
    pub fn adjustment_log(&self) -> &[AdjustmentRecord] {
        &self.cache.adjustment_log
    }

    /// Time of the last recalculation. Presentation only.
    #[must_use]
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.cache.last_sync
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&PortfolioSnapshot> {
        self.cache.snapshot.as_ref()
    }

    // ── Data intake ─────────────────────────────────────────────────

    /// Merge timeline items into the cached list. Returns how many were new.
    pub fn merge_transactions(&mut self, items: Vec<RawTransaction>) -> usize {
        let before = self.cache.transactions.len();
        self.cache.transactions = merge_transactions(&self.cache.transactions, items);
        self.cache.transactions.len().saturating_sub(before)
    }

    /// Fetch new timeline items and the current snapshot through `connection`,
    /// then recalculate.
    ///
    /// A failing fetch never aborts the sync: the cached transactions and
    /// snapshot are used instead and the report says so.
    pub async fn sync(
        &mut self,
        connection: &BrokerConnection,
        as_of: NaiveDate,
    ) -> Result<SyncReport, CoreError> {
        let fetcher = TimelineFetcher::new(self.settings.max_timeline_pages);
        let fetch = fetcher.fetch(connection, &self.cache.transactions).await;
        let used_cached = !fetch.is_complete();
        let added = self.merge_transactions(fetch.new_items);
        info!(run_id = %fetch.run_id, added, pages = fetch.pages, "timeline merged");

        let snapshot = match connection.fetch_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed, using cached positions");
                None
            }
        };

        let mut report = self.recalculate(snapshot, as_of).await?;
        report.used_cached_transactions = used_cached;
        Ok(report)
    }

    /// Rebuild every series from the cached transactions.
    ///
    /// `snapshot` replaces the cached broker snapshot when given. Adjustments
    /// are appended to the audit log, the cache is updated and, when backed
    /// by a store, written to disk. Only the write can fail.
    pub async fn recalculate(
        &mut self,
        snapshot: Option<PortfolioSnapshot>,
        as_of: NaiveDate,
    ) -> Result<SyncReport, CoreError> {
        let run_id = Uuid::new_v4();
        let today = Utc::now().date_naive();
        if let Some(snapshot) = snapshot {
            self.cache.snapshot = Some(snapshot);
        }
        let snapshot = self.cache.snapshot.clone();

        // 1. Classify
        let events = self.classifier.classify_all(&self.cache.transactions);
        let unmatched = events
            .skipped
            .iter()
            .filter(|s| s.reason.starts_with(UNCLASSIFIED_REASON))
            .count();
        let low_confidence = events
            .value
            .iter()
            .filter(|e| e.confidence == Confidence::Low)
            .count();

        // 2. Replay holdings, cash and invested capital
        let holdings = HoldingsService::new().build(&events.value, as_of);
        let cash_service = CashService::new();
        let cash = cash_service.build(&events.value);
        let invested = InvestedService::new().build(&events.value);

        // 3. Reconcile against the broker's positions
        let reconciliation = ReconciliationService::new(self.settings.reconciliation_epsilon);
        let (timeline, adjustments, residuals) = match snapshot.as_ref() {
            Some(snapshot) => {
                let outcome =
                    reconciliation.reconcile(&holdings.value, &snapshot.ground_truth(), as_of);
                self.append_adjustments(outcome.records);
                (outcome.timeline, outcome.adjustments, outcome.residuals)
            }
            None => (holdings.value.clone(), Vec::new(), Vec::new()),
        };
        let cash_gap =
            cash_service.compare_with_reported(&cash, snapshot.as_ref().and_then(|s| s.cash));

        // 4. Prices: executions first, external provider for the rest.
        // Renamed instruments keep their execution prices under the new ISIN.
        let priced_events = reconciliation.rename_instruments(&events.value, &adjustments);
        let positions: Vec<Instrument> = timeline.isins().map(Instrument::from_isin).collect();
        let history_service = PriceHistoryService::new(self.settings.price_grid_step_days);
        let mut prices = history_service.build(&priced_events, &positions, as_of);
        let from_dates = first_held_dates(&timeline);
        history_service
            .fill_from_external(
                &mut prices,
                &self.price_service,
                &mut self.cache.price_cache,
                &from_dates,
                as_of,
                today,
            )
            .await;

        // 5. Value
        let live_total = snapshot
            .as_ref()
            .filter(|_| as_of == today)
            .and_then(PortfolioSnapshot::live_total);
        let points = ValuationService::new().build(&ValuationInputs {
            holdings: &timeline,
            prices: &prices.value.series,
            invested: &invested,
            cash: &cash,
            live_total,
            as_of,
        });

        // 6. Performance
        let performance =
            PerformanceService::new(self.settings.twr_period_floor, self.settings.twr_period_cap);
        let series = performance.build_series(&points.value, self.settings.daily_gap_fill);
        let metrics = performance.metrics(&series);

        let mut skipped = events.skipped.clone();
        skipped.extend(holdings.skipped);
        skipped.extend(prices.skipped.iter().cloned());
        skipped.extend(points.skipped);

        let summary = ValidationSummary {
            total_transactions: self.cache.transactions.len(),
            classified: events.value.len(),
            unmatched,
            low_confidence,
            instruments: timeline.len(),
            priced_from_transactions: prices.value.count_by_source(PriceSource::Transaction),
            priced_externally: prices.value.count_by_source(PriceSource::External),
            unpriced: prices.value.missing.len(),
            cash_gap,
            residuals,
            skipped,
        };

        info!(
            run_id = %run_id,
            points = points.value.len(),
            classified = summary.classified,
            unmatched = summary.unmatched,
            adjustments = adjustments.len(),
            total_return = metrics.total_return,
            "recalculation finished"
        );

        self.cache.history = points.value;
        self.cache.performance = Some(series);
        self.cache.last_sync = Some(Utc::now());
        self.save()?;

        Ok(SyncReport {
            run_id,
            points: self.cache.history.len(),
            summary,
            adjustments,
            metrics,
            used_cached_transactions: false,
        })
    }

    /// Replay the user's flows into a benchmark price series on the history's dates.
    #[must_use]
    pub fn simulate_benchmark(&self, prices: &PriceSeries, source: FlowSource) -> Vec<ValuationPoint> {
        let events: Partial<Vec<ClassifiedEvent>> =
            self.classifier.classify_all(&self.cache.transactions);
        let invested = InvestedService::new().build(&events.value);
        let benchmark = BenchmarkService::new();
        let flows = benchmark.flows(source, &events.value, &invested);
        let dates: Vec<NaiveDate> = self.cache.history.iter().map(|p| p.date).collect();
        benchmark.simulate(prices, &flows, &dates)
    }

    /// Write the cache to the backing store, if any. Returns the file written.
    pub fn save(&self) -> Result<Option<PathBuf>, CoreError> {
        match &self.store {
            Some(store) => store.save(&self.cache).map(Some),
            None => Ok(None),
        }
    }

    /// Append new adjustments to the audit log.
    ///
    /// Recalculating from the same transactions yields the same adjustments
    /// again; a record equal to the latest logged one for its ISIN is not repeated.
    fn append_adjustments(&mut self, records: Vec<AdjustmentRecord>) {
        for record in records {
            let isin = record.adjustment.isin();
            let repeated = self
                .cache
                .adjustment_log
                .iter()
                .rev()
                .find(|r| r.adjustment.isin() == isin)
                .is_some_and(|r| r.adjustment == record.adjustment);
            if !repeated {
                info!(adjustment = %record.adjustment, "adjustment logged");
                self.cache.adjustment_log.push(record);
            }
        }
    }
}

/// First date each instrument appears in the holdings timeline.
fn first_held_dates(timeline: &HoldingsTimeline) -> BTreeMap<String, NaiveDate> {
    timeline
        .iter()
        .filter_map(|(isin, series)| {
            series
                .keys()
                .next()
                .map(|date| (isin.to_string(), *date))
        })
        .collect()
}
