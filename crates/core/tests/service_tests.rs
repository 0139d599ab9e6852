// ═══════════════════════════════════════════════════════════════════
// Service Tests — classifier, holdings, reconciliation, cash,
// invested capital, prices, valuation, performance, benchmark
// ═══════════════════════════════════════════════════════════════════

use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use portfolio_history_core::errors::CoreError;
use portfolio_history_core::models::event::{ClassifiedEvent, Confidence, EventKind};
use portfolio_history_core::models::holdings::{HoldingsTimeline, ReconciliationAdjustment};
use portfolio_history_core::models::instrument::{Instrument, InstrumentClass};
use portfolio_history_core::models::price::{PriceCache, PricePoint, PriceSeries, PriceSource};
use portfolio_history_core::models::report::Stage;
use portfolio_history_core::models::series::DateSeries;
use portfolio_history_core::models::transaction::RawTransaction;
use portfolio_history_core::models::valuation::{CashFlow, FlowSource, ValuationPoint};
use portfolio_history_core::providers::registry::PriceProviderRegistry;
use portfolio_history_core::providers::symbols::{Listing, SymbolResolver};
use portfolio_history_core::providers::traits::PriceProvider;
use portfolio_history_core::services::benchmark_service::BenchmarkService;
use portfolio_history_core::services::cash_service::CashService;
use portfolio_history_core::services::classifier_service::{ClassifierService, UNCLASSIFIED_REASON};
use portfolio_history_core::services::currency_service::CurrencyService;
use portfolio_history_core::services::holdings_service::HoldingsService;
use portfolio_history_core::services::invested_service::InvestedService;
use portfolio_history_core::services::performance_service::PerformanceService;
use portfolio_history_core::services::price_history_service::PriceHistoryService;
use portfolio_history_core::services::price_service::PriceService;
use portfolio_history_core::services::reconciliation_service::ReconciliationService;
use portfolio_history_core::services::valuation_service::{ValuationInputs, ValuationService};

const BTC: &str = "XF000BTC0017";
const ETF: &str = "IE00B5BMR087";
const BOND: &str = "XS2829712830";

// ═══════════════════════════════════════════════════════════════════
// Mock Providers
// ═══════════════════════════════════════════════════════════════════

struct MockQuotes {
    name: String,
    classes: Vec<InstrumentClass>,
    quotes: Vec<PricePoint>,
    calls: Arc<AtomicUsize>,
}

impl MockQuotes {
    fn new(quotes: Vec<PricePoint>) -> Self {
        Self {
            name: "MockQuotes".into(),
            classes: vec![InstrumentClass::Security, InstrumentClass::Crypto],
            quotes,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl PriceProvider for MockQuotes {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_classes(&self) -> Vec<InstrumentClass> {
        self.classes.clone()
    }

    async fn get_price_range(
        &self,
        _symbol: &str,
        _currency: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .quotes
            .iter()
            .filter(|p| p.date >= from && p.date <= to)
            .cloned()
            .collect())
    }
}

/// Constant FX rate from the start of any requested range.
struct MockFx {
    rate: f64,
}

#[async_trait]
impl PriceProvider for MockFx {
    fn name(&self) -> &str {
        "MockFx"
    }

    fn supported_classes(&self) -> Vec<InstrumentClass> {
        vec![InstrumentClass::Fiat]
    }

    async fn get_price_range(
        &self,
        _symbol: &str,
        _currency: &str,
        from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        Ok(vec![PricePoint {
            date: from,
            price: self.rate,
        }])
    }
}

/// A mock that always fails (for testing fallback behavior).
struct FailingMockProvider;

#[async_trait]
impl PriceProvider for FailingMockProvider {
    fn name(&self) -> &str {
        "FailingMock"
    }

    fn supported_classes(&self) -> Vec<InstrumentClass> {
        vec![InstrumentClass::Security, InstrumentClass::Crypto, InstrumentClass::Fiat]
    }

    async fn get_price_range(
        &self,
        _sym: &str,
        _cur: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        Err(CoreError::Api {
            provider: "FailingMock".into(),
            message: "Simulated failure".into(),
        })
    }
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn pp(date: NaiveDate, price: f64) -> PricePoint {
    PricePoint { date, price }
}

fn raw(id: &str, ts: &str, title: Option<&str>, subtitle: Option<&str>, amount: f64) -> RawTransaction {
    RawTransaction {
        id: Some(id.into()),
        timestamp: Some(ts.into()),
        title: title.map(str::to_string),
        subtitle: subtitle.map(str::to_string),
        amount: Some(amount),
        ..Default::default()
    }
}

fn ev(
    id: &str,
    date: NaiveDate,
    kind: EventKind,
    amount: f64,
    isin: Option<&str>,
    shares: Option<f64>,
) -> ClassifiedEvent {
    ClassifiedEvent {
        id: id.into(),
        timestamp: date.and_hms_opt(10, 0, 0).unwrap(),
        kind,
        confidence: Confidence::High,
        amount,
        currency: Some("EUR".into()),
        instrument: isin.map(Instrument::from_isin),
        shares,
    }
}

fn series(source: PriceSource, points: &[(NaiveDate, f64)]) -> PriceSeries {
    PriceSeries::new(source, points.iter().map(|(date, price)| pp(*date, *price)).collect())
}

// ═══════════════════════════════════════════════════════════════════
// ClassifierService
// ═══════════════════════════════════════════════════════════════════

mod classifier {
    use super::*;

    fn kind(title: Option<&str>, subtitle: Option<&str>, amount: f64) -> (EventKind, Confidence) {
        ClassifierService::default().classify(&raw("t", "2024-01-01", title, subtitle, amount))
    }

    #[test]
    fn buy_and_sell_subtitles() {
        assert_eq!(kind(Some("Bitcoin"), Some("Kauforder"), -500.0).0, EventKind::Buy);
        assert_eq!(kind(Some("ETF"), Some("Sparplan ausgeführt"), -25.0).0, EventKind::Buy);
        assert_eq!(kind(Some("Apple"), Some("Verkaufsorder"), 300.0).0, EventKind::Sell);
        assert_eq!(kind(Some("Apple"), Some("Stop-Sell-Order"), 300.0).0, EventKind::Sell);
    }

    #[test]
    fn deposit_by_title_needs_positive_amount() {
        assert_eq!(kind(Some("Einzahlung"), None, 1000.0), (EventKind::Deposit, Confidence::High));
        assert_eq!(kind(Some("Einzahlung"), None, -1000.0).0, EventKind::Other);
    }

    #[test]
    fn completed_incoming_transfer_is_deposit() {
        assert_eq!(kind(Some("Erika Muster"), Some("Fertig"), 50.0).0, EventKind::Deposit);
    }

    #[test]
    fn withdrawal_needs_negative_amount() {
        assert_eq!(kind(Some("Max Muster"), Some("Gesendet"), -300.0).0, EventKind::Withdrawal);
        assert_eq!(kind(Some("Max Muster"), Some("Gesendet"), 300.0).0, EventKind::Other);
    }

    #[test]
    fn dividend_and_interest() {
        assert_eq!(kind(Some("Apple"), Some("Bardividende"), 1.2).0, EventKind::Dividend);
        assert_eq!(kind(Some("Zinsen"), None, 3.0).0, EventKind::Interest);
        assert_eq!(kind(Some("Konto"), Some("3,25 % p.a."), 2.0).0, EventKind::Interest);
        assert_eq!(kind(Some("Saveback"), Some("1 % Bonus"), 0.5).0, EventKind::Interest);
        assert_eq!(kind(Some("Bund"), Some("Zinszahlung"), 7.0).0, EventKind::Interest);
    }

    #[test]
    fn tax_and_fee() {
        assert_eq!(kind(Some("Steuerkorrektur"), None, 4.0).0, EventKind::Tax);
        assert_eq!(kind(Some("ETF"), Some("Vorabpauschale"), -0.3).0, EventKind::Tax);
        assert_eq!(kind(Some("Kartengebühr"), None, -5.0).0, EventKind::Fee);
    }

    #[test]
    fn split_and_transfers() {
        assert_eq!(kind(Some("Nvidia"), Some("Aktiensplit"), 0.0).0, EventKind::Split);
        assert_eq!(kind(Some("ETF"), Some("Depotübertrag eingehend"), 0.0).0, EventKind::TransferIn);
        assert_eq!(kind(Some("ETF"), Some("Ausbuchung"), 0.0).0, EventKind::TransferOut);
    }

    #[test]
    fn rejected_orders_are_other() {
        assert_eq!(kind(Some("ETF"), Some("Sparplan fehlgeschlagen"), -25.0).0, EventKind::Other);
        assert_eq!(kind(Some("Apple"), Some("Abgelehnt"), -100.0).0, EventKind::Other);
    }

    #[test]
    fn legacy_person_name_is_low_confidence() {
        assert_eq!(kind(Some("Max Mustermann"), None, 100.0), (EventKind::Deposit, Confidence::Low));
        assert_eq!(kind(Some("Anna-Lena Schmidt"), None, -40.0), (EventKind::Withdrawal, Confidence::Low));
        assert_eq!(kind(Some("J. Doe"), None, 10.0), (EventKind::Deposit, Confidence::Low));
    }

    #[test]
    fn non_names_are_not_legacy_flows() {
        assert_eq!(kind(Some("Max"), None, 100.0).0, EventKind::Other);
        assert_eq!(kind(Some("MAX MUSTERMANN"), None, 100.0).0, EventKind::Other);
        assert_eq!(kind(Some("Trade Republic"), None, 100.0).0, EventKind::Other);
        assert_eq!(kind(Some("Rewe Markt 123"), None, -20.0).0, EventKind::Other);
    }

    #[test]
    fn unknown_vocabulary_is_other() {
        assert_eq!(kind(Some("Something"), Some("Unbekannt"), 1.0).0, EventKind::Other);
    }

    #[test]
    fn classify_all_reports_skips() {
        let txns = vec![
            raw("late", "2024-01-03", Some("Einzahlung"), None, 10.0),
            raw("early", "2024-01-01", Some("Einzahlung"), None, 20.0),
            raw("no-ts", "", Some("Einzahlung"), None, 10.0),
            RawTransaction {
                amount: None,
                ..raw("no-amount", "2024-01-02", Some("Einzahlung"), None, 0.0)
            },
            raw("unknown", "2024-01-02", Some("Foo"), Some("Bar"), 1.0),
        ];
        let result = ClassifierService::default().classify_all(&txns);

        let ids: Vec<&str> = result.value.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(result.skipped.len(), 3);
        assert!(result.skipped.iter().all(|s| s.stage == Stage::Classification));
        let unclassified: Vec<_> = result
            .skipped
            .iter()
            .filter(|s| s.reason.starts_with(UNCLASSIFIED_REASON))
            .collect();
        assert_eq!(unclassified.len(), 1);
        assert_eq!(unclassified[0].id, "unknown");
    }

    #[test]
    fn shares_are_made_positive() {
        let txn = RawTransaction {
            isin: Some(BTC.into()),
            shares: Some(-0.01),
            ..raw("b", "2024-01-01", Some("Bitcoin"), Some("Kauforder"), -500.0)
        };
        let result = ClassifierService::default().classify_all(&[txn]);
        assert_eq!(result.value[0].shares, Some(0.01));
        assert_eq!(result.value[0].isin(), Some(BTC));
    }

    #[test]
    fn custom_vocabulary() {
        let mut vocabulary = portfolio_history_core::models::settings::Vocabulary::default();
        vocabulary.buy_subtitles = vec!["Buy order".into()];
        let classifier = ClassifierService::new(vocabulary);
        let txn = raw("t", "2024-01-01", Some("Apple"), Some("Buy order"), -10.0);
        assert_eq!(classifier.classify(&txn).0, EventKind::Buy);
    }
}

// ═══════════════════════════════════════════════════════════════════
// HoldingsService
// ═══════════════════════════════════════════════════════════════════

mod holdings {
    use super::*;

    #[test]
    fn replays_buys_and_sells() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(2.0)),
            ev("s1", d(2024, 1, 5), EventKind::Sell, 60.0, Some(ETF), Some(0.5)),
        ];
        let result = HoldingsService::new().build(&events, d(2024, 1, 10));
        assert!(result.is_complete());
        let timeline = result.value;
        assert_eq!(timeline.quantity_as_of(ETF, d(2024, 1, 1)), Some(2.0));
        assert_eq!(timeline.quantity_as_of(ETF, d(2024, 1, 5)), Some(1.5));
        assert_eq!(timeline.series(ETF).unwrap().keys().next_back(), Some(&d(2024, 1, 10)));
    }

    #[test]
    fn replays_in_timestamp_order() {
        let events = vec![
            ev("s1", d(2024, 1, 5), EventKind::Sell, 60.0, Some(ETF), Some(1.0)),
            ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(2.0)),
        ];
        let timeline = HoldingsService::new().build(&events, d(2024, 1, 5)).value;
        assert_eq!(timeline.final_quantity(ETF), 1.0);
    }

    #[test]
    fn oversell_clamps_at_zero() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
            ev("s1", d(2024, 1, 2), EventKind::Sell, 300.0, Some(ETF), Some(3.0)),
        ];
        let timeline = HoldingsService::new().build(&events, d(2024, 1, 2)).value;
        assert_eq!(timeline.final_quantity(ETF), 0.0);
    }

    #[test]
    fn same_day_trades_record_end_of_day() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
            ev("b2", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
        ];
        let timeline = HoldingsService::new().build(&events, d(2024, 1, 1)).value;
        assert_eq!(timeline.series(ETF).unwrap().len(), 1);
        assert_eq!(timeline.final_quantity(ETF), 2.0);
    }

    #[test]
    fn bond_without_shares_uses_nominal() {
        let events = vec![ev("b1", d(2024, 1, 1), EventKind::Buy, -1000.0, Some(BOND), None)];
        let timeline = HoldingsService::new().build(&events, d(2024, 1, 1)).value;
        assert_eq!(timeline.final_quantity(BOND), 1000.0);
    }

    #[test]
    fn security_without_shares_is_skipped() {
        let events = vec![ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), None)];
        let result = HoldingsService::new().build(&events, d(2024, 1, 1));
        assert!(result.value.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].stage, Stage::Holdings);
    }

    #[test]
    fn missing_instrument_is_skipped() {
        let events = vec![ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, None, Some(1.0))];
        let result = HoldingsService::new().build(&events, d(2024, 1, 1));
        assert!(result.value.is_empty());
        assert_eq!(result.skipped[0].id, "b1");
    }

    #[test]
    fn events_after_as_of_are_skipped() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
            ev("b2", d(2024, 2, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
        ];
        let result = HoldingsService::new().build(&events, d(2024, 1, 15));
        assert_eq!(result.value.final_quantity(ETF), 1.0);
        assert_eq!(result.skipped.len(), 1);
    }

    #[test]
    fn splits_and_transfers_add() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
            ev("sp", d(2024, 1, 2), EventKind::Split, 0.0, Some(ETF), Some(9.0)),
            ev("ti", d(2024, 1, 3), EventKind::TransferIn, 0.0, Some(ETF), Some(5.0)),
            ev("to", d(2024, 1, 4), EventKind::TransferOut, 0.0, Some(ETF), Some(2.0)),
        ];
        let timeline = HoldingsService::new().build(&events, d(2024, 1, 4)).value;
        assert_eq!(timeline.quantity_as_of(ETF, d(2024, 1, 2)), Some(10.0));
        assert_eq!(timeline.final_quantity(ETF), 13.0);
    }

    #[test]
    fn cash_events_are_ignored() {
        let events = vec![ev("dep", d(2024, 1, 1), EventKind::Deposit, 100.0, None, None)];
        let result = HoldingsService::new().build(&events, d(2024, 1, 1));
        assert!(result.value.is_empty());
        assert!(result.is_complete());
    }
}

// ═══════════════════════════════════════════════════════════════════
// ReconciliationService
// ═══════════════════════════════════════════════════════════════════

mod reconciliation {
    use super::*;

    fn timeline(entries: &[(&str, NaiveDate, f64)]) -> HoldingsTimeline {
        let mut t = HoldingsTimeline::new();
        for (isin, date, qty) in entries {
            t.record(isin, *date, *qty);
        }
        t
    }

    fn truth(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn ratio_scales_history() {
        let computed = timeline(&[(BTC, d(2024, 1, 1), 0.01), (BTC, d(2024, 1, 2), 0.01)]);
        let outcome = ReconciliationService::default().reconcile(&computed, &truth(&[(BTC, 0.02)]), d(2024, 1, 2));

        assert_eq!(outcome.adjustments.len(), 1);
        match &outcome.adjustments[0] {
            ReconciliationAdjustment::Ratio { isin, multiplier } => {
                assert_eq!(isin, BTC);
                assert_relative_eq!(*multiplier, 2.0);
            }
            other => panic!("expected ratio, got {other:?}"),
        }
        assert_relative_eq!(outcome.timeline.quantity_as_of(BTC, d(2024, 1, 1)).unwrap(), 0.02);
        assert!(outcome.residuals.is_empty());
    }

    #[test]
    fn within_epsilon_is_untouched() {
        let computed = timeline(&[(ETF, d(2024, 1, 1), 10.0)]);
        let outcome = ReconciliationService::default().reconcile(&computed, &truth(&[(ETF, 10.0005)]), d(2024, 1, 1));
        assert!(outcome.adjustments.is_empty());
        assert_eq!(outcome.timeline, computed);
    }

    #[test]
    fn isin_change_transplants_history() {
        let old = "DE000A0D6554";
        let new = "DE000A40ZW88";
        let computed = timeline(&[(old, d(2024, 1, 1), 5.0)]);
        let outcome = ReconciliationService::default().reconcile(&computed, &truth(&[(new, 5.0)]), d(2024, 1, 1));

        assert_eq!(
            outcome.adjustments,
            vec![ReconciliationAdjustment::IsinChange {
                old_isin: old.into(),
                new_isin: new.into(),
                quantity: 5.0,
            }]
        );
        assert!(!outcome.timeline.contains(old));
        assert_eq!(outcome.timeline.quantity_as_of(new, d(2024, 1, 1)), Some(5.0));
    }

    #[test]
    fn renamed_events_follow_the_new_isin() {
        let old = "DE000A0D6554";
        let new = "DE000A40ZW88";
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -50.0, Some(old), Some(5.0)),
            ev("b2", d(2024, 1, 1), EventKind::Buy, -100.0, Some(ETF), Some(1.0)),
        ];
        let adjustments = vec![ReconciliationAdjustment::IsinChange {
            old_isin: old.into(),
            new_isin: new.into(),
            quantity: 5.0,
        }];

        let renamed = ReconciliationService::default().rename_instruments(&events, &adjustments);
        assert_eq!(renamed[0].isin(), Some(new));
        assert_eq!(renamed[1].isin(), Some(ETF));
        assert_eq!(renamed[0].shares, Some(5.0));

        let prices = PriceHistoryService::default().transaction_prices(&renamed);
        assert_eq!(prices[new][&d(2024, 1, 1)], 10.0);
        assert!(!prices.contains_key(old));
    }

    #[test]
    fn add_position_backfills_from_earliest_date() {
        let computed = timeline(&[(ETF, d(2024, 1, 1), 1.0), (ETF, d(2024, 3, 1), 1.0)]);
        let outcome = ReconciliationService::default().reconcile(
            &computed,
            &truth(&[(ETF, 1.0), (BTC, 0.5)]),
            d(2024, 3, 1),
        );

        assert_eq!(
            outcome.adjustments,
            vec![ReconciliationAdjustment::AddPosition {
                isin: BTC.into(),
                quantity: 0.5,
                effective_date: d(2024, 1, 1),
            }]
        );
        assert_eq!(outcome.timeline.quantity_as_of(BTC, d(2024, 1, 1)), Some(0.5));
        assert_eq!(outcome.timeline.quantity_as_of(BTC, d(2024, 3, 1)), Some(0.5));
    }

    #[test]
    fn add_position_on_empty_timeline_uses_fallback() {
        let outcome = ReconciliationService::default().reconcile(
            &HoldingsTimeline::new(),
            &truth(&[(ETF, 3.0)]),
            d(2024, 6, 1),
        );
        assert_eq!(outcome.timeline.quantity_as_of(ETF, d(2024, 6, 1)), Some(3.0));
        assert_eq!(outcome.timeline.quantity_as_of(ETF, d(2024, 5, 31)), None);
    }

    #[test]
    fn unreported_holdings_are_left_alone() {
        let computed = timeline(&[(ETF, d(2024, 1, 1), 4.0)]);
        let outcome = ReconciliationService::default().reconcile(&computed, &truth(&[]), d(2024, 1, 1));
        assert!(outcome.adjustments.is_empty());
        assert_eq!(outcome.timeline.final_quantity(ETF), 4.0);
    }

    #[test]
    fn records_match_adjustments() {
        let computed = timeline(&[(BTC, d(2024, 1, 1), 1.0)]);
        let outcome = ReconciliationService::default().reconcile(&computed, &truth(&[(BTC, 3.0)]), d(2024, 1, 1));
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].adjustment, outcome.adjustments[0]);
        assert_eq!(outcome.records[0].computed_quantity, 1.0);
        assert_eq!(outcome.records[0].ground_truth_quantity, 3.0);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let computed = timeline(&[(BTC, d(2024, 1, 1), 0.01), ("DE000A0D6554", d(2024, 1, 1), 2.0)]);
        let gt = truth(&[(BTC, 0.02), ("DE000A40ZW88", 2.0), (ETF, 1.0)]);
        let service = ReconciliationService::default();
        let first = service.reconcile(&computed, &gt, d(2024, 1, 1));
        assert_eq!(first.adjustments.len(), 3);
        let second = service.reconcile(&first.timeline, &gt, d(2024, 1, 1));
        assert!(second.adjustments.is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// CashService & InvestedService
// ═══════════════════════════════════════════════════════════════════

mod cash {
    use super::*;

    #[test]
    fn running_balance() {
        let events = vec![
            ev("dep", d(2024, 1, 1), EventKind::Deposit, 1000.0, None, None),
            ev("buy", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01)),
            ev("div", d(2024, 1, 2), EventKind::Dividend, 10.0, Some(ETF), None),
            ev("fee", d(2024, 1, 3), EventKind::Fee, -1.0, None, None),
            ev("tax", d(2024, 1, 3), EventKind::Tax, -2.0, None, None),
            ev("wd", d(2024, 1, 4), EventKind::Withdrawal, -300.0, None, None),
        ];
        let cash = CashService::new().build(&events);
        assert_eq!(cash.get(d(2024, 1, 1)), Some(500.0));
        assert_eq!(cash.get(d(2024, 1, 2)), Some(510.0));
        assert_eq!(cash.get(d(2024, 1, 3)), Some(507.0));
        assert_eq!(cash.get(d(2024, 1, 4)), Some(207.0));
    }

    #[test]
    fn splits_do_not_move_cash() {
        let events = vec![ev("sp", d(2024, 1, 1), EventKind::Split, 0.0, Some(ETF), Some(1.0))];
        assert!(CashService::new().build(&events).is_empty());
    }

    #[test]
    fn gap_against_reported() {
        let events = vec![ev("dep", d(2024, 1, 1), EventKind::Deposit, 100.0, None, None)];
        let service = CashService::new();
        let cash = service.build(&events);
        assert_eq!(service.compare_with_reported(&cash, Some(95.0)), Some(5.0));
        assert_eq!(service.compare_with_reported(&cash, None), None);
    }
}

mod invested {
    use super::*;

    #[test]
    fn only_external_flows_count() {
        let mut low = ev("p2p", d(2024, 1, 3), EventKind::Deposit, 50.0, None, None);
        low.confidence = Confidence::Low;
        let events = vec![
            ev("dep", d(2024, 1, 1), EventKind::Deposit, 1000.0, None, None),
            ev("buy", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01)),
            ev("div", d(2024, 1, 2), EventKind::Dividend, 10.0, None, None),
            low,
            ev("wd", d(2024, 1, 4), EventKind::Withdrawal, -300.0, None, None),
        ];
        let invested = InvestedService::new().build(&events);
        assert_eq!(invested.len(), 2);
        assert_eq!(invested.get(d(2024, 1, 1)), Some(1000.0));
        assert_eq!(invested.value_as_of(d(2024, 1, 3)), Some(1000.0));
        assert_eq!(invested.get(d(2024, 1, 4)), Some(700.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceService & CurrencyService
// ═══════════════════════════════════════════════════════════════════

mod price_service {
    use super::*;

    fn etf() -> Instrument {
        Instrument::from_isin(ETF)
    }

    fn resolver(currency: &str) -> SymbolResolver {
        SymbolResolver::offline().with_listing(ETF, Listing::new("EUNL.DE", currency))
    }

    #[tokio::test]
    async fn fetches_and_caches() {
        let provider = MockQuotes::new(vec![pp(d(2024, 1, 2), 80.0), pp(d(2024, 1, 30), 90.0)]);
        let calls = provider.calls.clone();
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(provider));
        let service = PriceService::new(registry, resolver("EUR"), "EUR");
        let mut cache = PriceCache::new();

        let first = service
            .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 1, 31), d(2024, 2, 10))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(cache.get_price(ETF, "EUR", d(2024, 1, 30)), Some(90.0));
        assert_eq!(cache.last_updated(ETF, "EUR"), Some(d(2024, 2, 10)));

        let second = service
            .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 1, 31), d(2024, 2, 10))
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn converts_foreign_quotes() {
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(MockQuotes::new(vec![pp(d(2024, 1, 2), 100.0)])));
        registry.register(Box::new(MockFx { rate: 0.9 }));
        let service = PriceService::new(registry, resolver("USD"), "EUR");
        let mut cache = PriceCache::new();

        let points = service
            .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 1, 5), d(2024, 3, 1))
            .await
            .unwrap();
        assert_relative_eq!(points[0].price, 90.0);
    }

    #[tokio::test]
    async fn missing_fx_drops_quotes() {
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(MockQuotes::new(vec![pp(d(2024, 1, 2), 100.0)])));
        let service = PriceService::new(registry, resolver("USD"), "EUR");
        let mut cache = PriceCache::new();

        let err = service
            .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 1, 5), d(2024, 3, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PriceNotAvailable { symbol, .. } if symbol == "EUNL.DE"));
        assert_eq!(cache.total_entries(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_next_provider() {
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(FailingMockProvider));
        registry.register(Box::new(MockQuotes::new(vec![pp(d(2024, 1, 2), 80.0)])));
        let service = PriceService::new(registry, resolver("EUR"), "EUR");
        let mut cache = PriceCache::new();

        let points = service
            .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 1, 5), d(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn unknown_ticker_is_symbol_not_found() {
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(MockQuotes::new(vec![pp(d(2024, 1, 2), 80.0)])));
        let service = PriceService::new(registry, SymbolResolver::offline(), "EUR");
        let mut cache = PriceCache::new();

        let unknown = Instrument::from_isin("DE000UNKNOWN");
        let err = service
            .fetch_history(&mut cache, &unknown, d(2024, 1, 1), d(2024, 1, 5), d(2024, 3, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SymbolNotFound(isin) if isin == "DE000UNKNOWN"));
    }

    #[tokio::test]
    async fn no_provider_for_class() {
        let service = PriceService::offline("EUR");
        let bond = Instrument::from_isin(BOND);
        let err = service
            .fetch_history(&mut PriceCache::new(), &bond, d(2024, 1, 1), d(2024, 1, 5), d(2024, 3, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoProvider(class) if class == "Bond"));
    }

    #[tokio::test]
    async fn late_listing_is_not_refetched() {
        // First close a month after the requested start: the instrument listed later.
        let provider = MockQuotes::new(vec![pp(d(2024, 2, 1), 50.0), pp(d(2024, 2, 28), 55.0)]);
        let calls = provider.calls.clone();
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(provider));
        let service = PriceService::new(registry, resolver("EUR"), "EUR");
        let mut cache = PriceCache::new();

        for _ in 0..3 {
            let points = service
                .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 2, 29), d(2024, 4, 1))
                .await
                .unwrap();
            assert_eq!(points.len(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.fetched_from(ETF, "EUR"), Some(d(2024, 1, 1)));

        // An earlier start than ever requested still goes to the provider.
        service
            .fetch_history(&mut cache, &etf(), d(2023, 12, 1), d(2024, 2, 29), d(2024, 4, 1))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.fetched_from(ETF, "EUR"), Some(d(2023, 12, 1)));
    }

    #[tokio::test]
    async fn offline_serves_cached_prices() {
        let service = PriceService::offline("EUR");
        let mut cache = PriceCache::new();
        cache.set_price(ETF, "EUR", d(2024, 1, 3), 77.0);

        let points = service
            .fetch_history(&mut cache, &etf(), d(2024, 1, 1), d(2024, 3, 1), d(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(points, vec![pp(d(2024, 1, 3), 77.0)]);
    }

    #[test]
    fn provider_names() {
        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(FailingMockProvider));
        let service = PriceService::new(registry, SymbolResolver::offline(), "eur");
        assert_eq!(service.account_currency(), "EUR");
        assert_eq!(service.get_provider_names(&etf()), vec!["FailingMock".to_string()]);
    }
}

mod currency {
    use super::*;

    #[test]
    fn applies_as_of_rate() {
        let quotes = vec![pp(d(2024, 1, 1), 10.0), pp(d(2024, 1, 5), 10.0), pp(d(2024, 1, 10), 10.0)];
        let rates = vec![pp(d(2024, 1, 2), 2.0), pp(d(2024, 1, 8), 3.0)];
        let converted = CurrencyService::new().apply_rates(&quotes, &rates);
        // No rate yet on Jan 1.
        assert_eq!(converted, vec![pp(d(2024, 1, 5), 20.0), pp(d(2024, 1, 10), 30.0)]);
    }

    #[tokio::test]
    async fn same_currency_passes_through() {
        let quotes = vec![pp(d(2024, 1, 1), 10.0)];
        let converted = CurrencyService::new()
            .convert_points(&PriceProviderRegistry::new(), quotes.clone(), "eur", "EUR")
            .await;
        assert_eq!(converted, quotes);
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceHistoryService
// ═══════════════════════════════════════════════════════════════════

mod price_history {
    use super::*;

    #[test]
    fn execution_prices() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01)),
            ev("bond", d(2024, 1, 1), EventKind::Buy, -1000.0, Some(BOND), None),
            ev("dep", d(2024, 1, 1), EventKind::Deposit, 1000.0, None, None),
        ];
        let prices = PriceHistoryService::default().transaction_prices(&events);
        assert_relative_eq!(prices[BTC][&d(2024, 1, 1)], 50_000.0);
        assert_relative_eq!(prices[BOND][&d(2024, 1, 1)], 1.0);
        assert_eq!(prices.len(), 2);
    }

    #[test]
    fn last_trade_of_day_wins() {
        let mut late = ev("b2", d(2024, 1, 1), EventKind::Buy, -600.0, Some(BTC), Some(0.01));
        late.timestamp = d(2024, 1, 1).and_hms_opt(18, 0, 0).unwrap();
        let events = vec![
            late,
            ev("b1", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01)),
        ];
        let prices = PriceHistoryService::default().transaction_prices(&events);
        assert_relative_eq!(prices[BTC][&d(2024, 1, 1)], 60_000.0);
    }

    #[test]
    fn weekly_grid_with_extras() {
        let grid = PriceHistoryService::new(7).grid(d(2024, 1, 1), d(2024, 1, 20), [d(2024, 1, 3), d(2025, 1, 1)]);
        let dates: Vec<NaiveDate> = grid.into_iter().collect();
        assert_eq!(
            dates,
            vec![d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 8), d(2024, 1, 15), d(2024, 1, 20)]
        );
    }

    #[test]
    fn forward_fill_never_backward() {
        let service = PriceHistoryService::default();
        let known = BTreeMap::from([(d(2024, 1, 5), 10.0)]);
        let grid = service.grid(d(2024, 1, 1), d(2024, 1, 15), []);
        let filled = service.forward_fill(PriceSource::Transaction, &known, &grid);
        assert_eq!(filled.first_date(), Some(d(2024, 1, 5)));
        assert_eq!(filled.price_as_of(d(2024, 1, 15)), Some(10.0));
    }

    #[test]
    fn positions_without_trades_are_missing() {
        let events = vec![ev("b1", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01))];
        let history = PriceHistoryService::default().build(&events, &[Instrument::from_isin(ETF)], d(2024, 1, 31));
        assert!(history.value.series.contains_key(BTC));
        assert_eq!(history.value.missing, vec![Instrument::from_isin(ETF)]);
        assert_eq!(history.value.count_by_source(PriceSource::Transaction), 1);
    }

    #[tokio::test]
    async fn external_fallback_fills_missing() {
        let events = vec![ev("b1", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01))];
        let service = PriceHistoryService::default();
        let mut history = service.build(&events, &[Instrument::from_isin(ETF)], d(2024, 1, 31));

        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(MockQuotes::new(vec![pp(d(2024, 1, 2), 80.0), pp(d(2024, 1, 20), 90.0)])));
        let prices = PriceService::new(
            registry,
            SymbolResolver::offline().with_listing(ETF, Listing::new("EUNL.DE", "EUR")),
            "EUR",
        );
        let mut cache = PriceCache::new();
        let from = BTreeMap::from([(ETF.to_string(), d(2024, 1, 1))]);

        service
            .fill_from_external(&mut history, &prices, &mut cache, &from, d(2024, 1, 31), d(2024, 1, 31))
            .await;

        assert!(history.value.missing.is_empty());
        let etf = &history.value.series[ETF];
        assert_eq!(etf.source, PriceSource::External);
        assert_eq!(etf.price_as_of(d(2024, 1, 1)), None);
        assert_eq!(etf.price_as_of(d(2024, 1, 8)), Some(80.0));
        assert_eq!(etf.price_as_of(d(2024, 1, 31)), Some(90.0));
        assert_eq!(history.value.count_by_source(PriceSource::External), 1);
    }

    #[tokio::test]
    async fn unpriceable_instruments_are_reported() {
        let service = PriceHistoryService::default();
        let mut history = service.build(&[], &[Instrument::from_isin(ETF)], d(2024, 1, 31));
        let mut cache = PriceCache::new();

        service
            .fill_from_external(
                &mut history,
                &PriceService::offline("EUR"),
                &mut cache,
                &BTreeMap::new(),
                d(2024, 1, 31),
                d(2024, 1, 31),
            )
            .await;

        assert_eq!(history.value.missing.len(), 1);
        assert_eq!(history.skipped.len(), 1);
        assert_eq!(history.skipped[0].stage, Stage::Prices);
        assert_eq!(history.skipped[0].id, ETF);
    }
}

// ═══════════════════════════════════════════════════════════════════
// ValuationService
// ═══════════════════════════════════════════════════════════════════

mod valuation {
    use super::*;

    struct Fixture {
        holdings: HoldingsTimeline,
        prices: BTreeMap<String, PriceSeries>,
        invested: DateSeries,
        cash: DateSeries,
    }

    fn fixture() -> Fixture {
        let mut holdings = HoldingsTimeline::new();
        holdings.record("A", d(2024, 1, 1), 2.0);
        let prices = BTreeMap::from([(
            "A".to_string(),
            series(PriceSource::Transaction, &[(d(2024, 1, 1), 10.0), (d(2024, 1, 3), 20.0)]),
        )]);
        let mut invested = DateSeries::new();
        invested.insert(d(2024, 1, 1), 100.0);
        let mut cash = DateSeries::new();
        cash.insert(d(2024, 1, 1), 80.0);
        Fixture {
            holdings,
            prices,
            invested,
            cash,
        }
    }

    fn inputs(f: &Fixture, live_total: Option<f64>, as_of: NaiveDate) -> ValuationInputs<'_> {
        ValuationInputs {
            holdings: &f.holdings,
            prices: &f.prices,
            invested: &f.invested,
            cash: &f.cash,
            live_total,
            as_of,
        }
    }

    #[test]
    fn holdings_times_prices_plus_cash() {
        let f = fixture();
        let points = ValuationService::new().build(&inputs(&f, None, d(2024, 1, 3))).value;
        assert_eq!(
            points,
            vec![
                ValuationPoint { date: d(2024, 1, 1), invested: 100.0, value: 100.0 },
                ValuationPoint { date: d(2024, 1, 3), invested: 100.0, value: 120.0 },
            ]
        );
    }

    #[test]
    fn nothing_after_as_of() {
        let f = fixture();
        let points = ValuationService::new().build(&inputs(&f, None, d(2024, 1, 2))).value;
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn nothing_before_first_investment() {
        let mut f = fixture();
        f.holdings.record("A", d(2023, 12, 1), 1.0);
        let points = ValuationService::new().build(&inputs(&f, None, d(2024, 1, 3))).value;
        assert_eq!(points[0].date, d(2024, 1, 1));
    }

    #[test]
    fn unpriced_holding_is_excluded_and_reported_once() {
        let mut f = fixture();
        f.holdings.record("B", d(2024, 1, 1), 5.0);
        let result = ValuationService::new().build(&inputs(&f, None, d(2024, 1, 3)));
        assert_eq!(result.value[1].value, 120.0);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].stage, Stage::Valuation);
        assert_eq!(result.skipped[0].id, "B");
    }

    #[test]
    fn negative_cash_counts_as_zero() {
        let mut f = fixture();
        f.cash.insert(d(2024, 1, 1), -50.0);
        let points = ValuationService::new().build(&inputs(&f, None, d(2024, 1, 1))).value;
        assert_eq!(points[0].value, 20.0);
    }

    #[test]
    fn live_total_overrides_as_of_point() {
        let f = fixture();
        let points = ValuationService::new().build(&inputs(&f, Some(500.0), d(2024, 1, 3))).value;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].value, 500.0);
    }

    #[test]
    fn live_total_appends_missing_as_of_point() {
        let f = fixture();
        let points = ValuationService::new().build(&inputs(&f, Some(500.0), d(2024, 1, 9))).value;
        assert_eq!(points.len(), 3);
        assert_eq!(points[2], ValuationPoint { date: d(2024, 1, 9), invested: 100.0, value: 500.0 });
    }

    #[test]
    fn no_invested_capital_no_history() {
        let mut f = fixture();
        f.invested = DateSeries::new();
        assert!(ValuationService::new().build(&inputs(&f, None, d(2024, 1, 3))).value.is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// PerformanceService
// ═══════════════════════════════════════════════════════════════════

mod performance {
    use super::*;

    fn p(date: NaiveDate, invested: f64, value: f64) -> ValuationPoint {
        ValuationPoint { date, invested, value }
    }

    #[test]
    fn twr_chains_period_returns() {
        let twr = PerformanceService::default().calculate_twr(&[100.0, 110.0, 99.0], &[100.0, 100.0, 100.0]);
        assert_relative_eq!(twr[0], 0.0);
        assert_relative_eq!(twr[1], 10.0, epsilon = 1e-9);
        assert_relative_eq!(twr[2], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn twr_removes_cash_flows() {
        // A deposit is not performance.
        let twr = PerformanceService::default().calculate_twr(&[1000.0, 2000.0], &[1000.0, 2000.0]);
        assert_relative_eq!(twr[1], 0.0);
    }

    #[test]
    fn twr_withdrawal_uses_start_of_period_convention() {
        let twr = PerformanceService::default()
            .calculate_twr(&[1000.0, 1500.0, 1200.0], &[1000.0, 1000.0, 700.0]);
        assert_relative_eq!(twr[1], 50.0, epsilon = 1e-9);
        assert_relative_eq!(twr[2], 50.0, epsilon = 1e-9);
    }

    #[test]
    fn twr_clamps_glitches() {
        let service = PerformanceService::default();
        assert_relative_eq!(service.calculate_twr(&[100.0, 500.0], &[100.0, 100.0])[1], 100.0);
        assert_relative_eq!(service.calculate_twr(&[100.0, 10.0], &[100.0, 100.0])[1], -50.0);
    }

    #[test]
    fn twr_skips_empty_periods() {
        let twr = PerformanceService::default().calculate_twr(&[0.0, 0.0, 100.0], &[0.0, 0.0, 100.0]);
        assert_eq!(twr, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn twr_empty_input() {
        assert!(PerformanceService::default().calculate_twr(&[], &[]).is_empty());
    }

    #[test]
    fn drawdown_from_running_peak() {
        let dd = PerformanceService::default().calculate_drawdown(&[0.0, 10.0, -1.0, 20.0]);
        assert_relative_eq!(dd[0], 0.0);
        assert_relative_eq!(dd[1], 0.0);
        assert_relative_eq!(dd[2], -10.0, epsilon = 1e-9);
        assert_relative_eq!(dd[3], 0.0);
    }

    #[test]
    fn rebase_reanchors_subrange() {
        let rebased = PerformanceService::default().rebase(&[10.0, 21.0]);
        assert_relative_eq!(rebased[0], 0.0);
        assert_relative_eq!(rebased[1], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn fill_daily_forward_fills() {
        let filled = PerformanceService::default()
            .fill_daily(&[p(d(2024, 1, 4), 100.0, 120.0), p(d(2024, 1, 1), 100.0, 100.0)]);
        assert_eq!(filled.len(), 4);
        assert_eq!(filled[1], p(d(2024, 1, 2), 100.0, 100.0));
        assert_eq!(filled[3].value, 120.0);
    }

    #[test]
    fn series_vectors_align() {
        let points = vec![p(d(2024, 1, 1), 100.0, 100.0), p(d(2024, 1, 10), 100.0, 150.0)];
        let service = PerformanceService::default();
        let daily = service.build_series(&points, true);
        assert_eq!(daily.len(), 10);
        assert_eq!(daily.twr.len(), 10);
        assert_eq!(daily.drawdown.len(), 10);
        assert_relative_eq!(*daily.twr.last().unwrap(), 50.0, epsilon = 1e-9);

        let sparse = service.build_series(&points, false);
        assert_eq!(sparse.len(), 2);
    }

    #[test]
    fn metrics() {
        let points = vec![
            p(d(2024, 1, 1), 100.0, 100.0),
            p(d(2024, 1, 2), 100.0, 110.0),
            p(d(2024, 1, 3), 100.0, 99.0),
        ];
        let service = PerformanceService::default();
        let m = service.metrics(&service.build_series(&points, false));
        assert_relative_eq!(m.total_return, -1.0, epsilon = 1e-9);
        assert_relative_eq!(m.max_drawdown, -10.0, epsilon = 1e-9);
        let expected_annual = (0.99f64.powf(252.0 / 2.0) - 1.0) * 100.0;
        assert_relative_eq!(m.annualized_return, expected_annual, epsilon = 1e-9);
        assert_relative_eq!(m.volatility, 0.1 * 252f64.sqrt() * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn metrics_need_two_points() {
        let service = PerformanceService::default();
        let m = service.metrics(&service.build_series(&[p(d(2024, 1, 1), 1.0, 1.0)], false));
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.volatility, 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// BenchmarkService
// ═══════════════════════════════════════════════════════════════════

mod benchmark {
    use super::*;

    fn flow(date: NaiveDate, amount: f64) -> CashFlow {
        CashFlow { date, amount }
    }

    #[test]
    fn buys_and_proportional_sells() {
        let prices = series(PriceSource::External, &[(d(2024, 1, 1), 10.0), (d(2024, 1, 3), 20.0)]);
        let flows = vec![flow(d(2024, 1, 1), 100.0), flow(d(2024, 1, 3), -50.0)];
        let points = BenchmarkService::new().simulate(&prices, &flows, &[d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);

        assert_eq!(points[0], ValuationPoint { date: d(2024, 1, 1), invested: 100.0, value: 100.0 });
        assert_eq!(points[1].value, 100.0);
        assert_eq!(points[2], ValuationPoint { date: d(2024, 1, 3), invested: 50.0, value: 100.0 });
    }

    #[test]
    fn flow_before_prices_uses_first_price() {
        let prices = series(PriceSource::External, &[(d(2024, 1, 5), 10.0), (d(2024, 1, 6), 11.0)]);
        let flows = vec![flow(d(2024, 1, 1), 100.0)];
        let points = BenchmarkService::new().simulate(&prices, &flows, &[d(2024, 1, 1), d(2024, 1, 6)]);
        // Unpriced dates show the invested amount.
        assert_eq!(points[0].value, 100.0);
        assert_relative_eq!(points[1].value, 110.0, epsilon = 1e-9);
    }

    #[test]
    fn oversized_withdrawal_empties_position() {
        let prices = series(PriceSource::External, &[(d(2024, 1, 1), 10.0)]);
        let flows = vec![flow(d(2024, 1, 1), 100.0), flow(d(2024, 1, 2), -500.0)];
        let points = BenchmarkService::new().simulate(&prices, &flows, &[d(2024, 1, 2)]);
        assert_eq!(points[0].value, 0.0);
        assert_eq!(points[0].invested, 0.0);
    }

    #[test]
    fn external_flows_from_invested_capital() {
        let mut invested = DateSeries::new();
        invested.insert(d(2024, 1, 1), 100.0);
        invested.insert(d(2024, 1, 3), 50.0);
        let flows = BenchmarkService::new().flows(FlowSource::External, &[], &invested);
        assert_eq!(flows, vec![flow(d(2024, 1, 1), 100.0), flow(d(2024, 1, 3), -50.0)]);
    }

    #[test]
    fn trade_flows_from_buys_and_sells() {
        let events = vec![
            ev("b1", d(2024, 1, 1), EventKind::Buy, -500.0, Some(BTC), Some(0.01)),
            ev("s1", d(2024, 1, 2), EventKind::Sell, 200.0, Some(BTC), Some(0.002)),
            ev("dep", d(2024, 1, 1), EventKind::Deposit, 1000.0, None, None),
        ];
        let flows = BenchmarkService::new().flows(FlowSource::Trades, &events, &DateSeries::new());
        assert_eq!(flows, vec![flow(d(2024, 1, 1), 500.0), flow(d(2024, 1, 2), -200.0)]);
    }
}
