//! Property tests for reconstruction invariants.
//!
//! Uses proptest to verify:
//! 1. Holdings are never negative, whatever order trades arrive in
//! 2. Reconciliation is idempotent: a second pass adjusts nothing
//! 3. Invested capital only grows when only deposits happen
//! 4. TWR rebasing is consistent with chaining
//! 5. Drawdown stays within [-100, 0]

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::BTreeMap;

use portfolio_history_core::models::event::{ClassifiedEvent, Confidence, EventKind};
use portfolio_history_core::models::holdings::HoldingsTimeline;
use portfolio_history_core::models::instrument::Instrument;
use portfolio_history_core::services::cash_service::CashService;
use portfolio_history_core::services::holdings_service::HoldingsService;
use portfolio_history_core::services::invested_service::InvestedService;
use portfolio_history_core::services::performance_service::PerformanceService;
use portfolio_history_core::services::reconciliation_service::ReconciliationService;

const ISINS: [&str; 4] = ["XF000BTC0017", "IE00B5BMR087", "US0378331005", "DE0007164600"];

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn event(day: i64, kind: EventKind, amount: f64, isin: Option<&str>, shares: Option<f64>) -> ClassifiedEvent {
    ClassifiedEvent {
        id: format!("{kind}-{day}"),
        timestamp: (start() + Duration::days(day)).and_hms_opt(12, 0, 0).unwrap(),
        kind,
        confidence: Confidence::High,
        amount,
        currency: Some("EUR".into()),
        instrument: isin.map(Instrument::from_isin),
        shares,
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_quantity() -> impl Strategy<Value = f64> {
    (0.01..100.0_f64).prop_map(|q| (q * 100.0).round() / 100.0)
}

/// (day, is_buy, isin index, shares)
fn arb_trade() -> impl Strategy<Value = (i64, bool, usize, f64)> {
    (0..90_i64, any::<bool>(), 0..ISINS.len(), arb_quantity())
}

/// Final quantity per ISIN; `None` means not held / not reported.
fn arb_book() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::of(arb_quantity()), ISINS.len())
}

fn arb_returns() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.6..1.2_f64, 1..60)
}

// ── 1. Holdings ──────────────────────────────────────────────────────

proptest! {
    /// Sells beyond the tracked balance clamp at zero; nothing goes negative.
    #[test]
    fn holdings_never_negative(trades in prop::collection::vec(arb_trade(), 0..40)) {
        let events: Vec<ClassifiedEvent> = trades
            .iter()
            .map(|(day, is_buy, idx, shares)| {
                let kind = if *is_buy { EventKind::Buy } else { EventKind::Sell };
                event(*day, kind, -10.0, Some(ISINS[*idx]), Some(*shares))
            })
            .collect();
        let as_of = start() + Duration::days(90);
        let timeline = HoldingsService::new().build(&events, as_of).value;

        for (_, series) in timeline.iter() {
            prop_assert!(series.values().all(|q| *q >= 0.0));
            prop_assert!(series.keys().all(|d| *d <= as_of));
        }
    }

    /// Input order does not matter: replay is by timestamp.
    #[test]
    fn holdings_independent_of_input_order(trades in prop::collection::vec(arb_trade(), 0..30)) {
        let events: Vec<ClassifiedEvent> = trades
            .iter()
            .enumerate()
            .map(|(i, (_, is_buy, idx, shares))| {
                let kind = if *is_buy { EventKind::Buy } else { EventKind::Sell };
                // Distinct days keep the replay order unambiguous.
                event(i as i64, kind, -10.0, Some(ISINS[*idx]), Some(*shares))
            })
            .collect();
        let mut reversed = events.clone();
        reversed.reverse();

        let as_of = start() + Duration::days(60);
        let service = HoldingsService::new();
        prop_assert_eq!(service.build(&events, as_of).value, service.build(&reversed, as_of).value);
    }
}

// ── 2. Reconciliation ────────────────────────────────────────────────

proptest! {
    #[test]
    fn reconciliation_is_idempotent(computed in arb_book(), truth in arb_book()) {
        let mut timeline = HoldingsTimeline::new();
        for (isin, quantity) in ISINS.iter().zip(&computed) {
            if let Some(q) = quantity {
                timeline.record(isin, start(), *q);
            }
        }
        let ground_truth: BTreeMap<String, f64> = ISINS
            .iter()
            .zip(&truth)
            .filter_map(|(isin, q)| q.map(|q| (isin.to_string(), q)))
            .collect();

        let service = ReconciliationService::default();
        let first = service.reconcile(&timeline, &ground_truth, start());
        prop_assert!(first.residuals.is_empty());

        let second = service.reconcile(&first.timeline, &ground_truth, start());
        prop_assert!(second.adjustments.is_empty());
        prop_assert_eq!(second.timeline, first.timeline);
    }
}

// ── 3. Cash and invested capital ─────────────────────────────────────

proptest! {
    #[test]
    fn deposits_only_grow_invested(deposits in prop::collection::vec((0..60_i64, arb_quantity()), 1..20)) {
        let events: Vec<ClassifiedEvent> = deposits
            .iter()
            .map(|(day, amount)| event(*day, EventKind::Deposit, *amount, None, None))
            .collect();
        let invested = InvestedService::new().build(&events);
        let values: Vec<f64> = invested.iter().map(|(_, v)| v).collect();
        prop_assert!(values.windows(2).all(|w| w[1] >= w[0]));

        let total: f64 = deposits.iter().map(|(_, a)| a).sum();
        prop_assert!((invested.last_value().unwrap_or(0.0) - total).abs() < 1e-6);
    }

    #[test]
    fn cash_is_the_sum_of_deltas(flows in prop::collection::vec((0..60_i64, -500.0..500.0_f64), 0..30)) {
        let events: Vec<ClassifiedEvent> = flows
            .iter()
            .map(|(day, amount)| {
                let kind = if *amount >= 0.0 { EventKind::Deposit } else { EventKind::Withdrawal };
                event(*day, kind, *amount, None, None)
            })
            .collect();
        let cash = CashService::new().build(&events);
        let total: f64 = flows.iter().map(|(_, a)| a).sum();
        prop_assert!((cash.last_value().unwrap_or(0.0) - total).abs() < 1e-6);
    }
}

// ── 4. & 5. Performance ──────────────────────────────────────────────

proptest! {
    /// Rebasing a tail gives the same compounded return as the full series.
    #[test]
    fn rebase_matches_chaining(returns in arb_returns(), cut in 0usize..30) {
        let mut values = vec![100.0];
        for r in &returns {
            let last = *values.last().unwrap();
            values.push(last * (1.0 + r));
        }
        let invested = vec![100.0; values.len()];
        let service = PerformanceService::default();
        let twr = service.calculate_twr(&values, &invested);

        let cut = cut.min(twr.len() - 1);
        let rebased = service.rebase(&twr[cut..]);
        prop_assert!(rebased[0].abs() < 1e-9);

        let anchor = 1.0 + twr[cut] / 100.0;
        for (offset, r) in rebased.iter().enumerate() {
            let expected = 1.0 + twr[cut + offset] / 100.0;
            let chained = anchor * (1.0 + r / 100.0);
            prop_assert!((expected - chained).abs() < 1e-6 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn drawdown_is_bounded(returns in arb_returns()) {
        let mut values = vec![100.0];
        for r in &returns {
            let last = *values.last().unwrap();
            values.push(last * (1.0 + r));
        }
        let invested = vec![100.0; values.len()];
        let service = PerformanceService::default();
        let twr = service.calculate_twr(&values, &invested);
        let drawdown = service.calculate_drawdown(&twr);

        prop_assert_eq!(drawdown.len(), twr.len());
        prop_assert!(twr.iter().all(|t| t.is_finite() && *t >= -100.0));
        prop_assert!(drawdown.iter().all(|d| *d <= 0.0 && *d >= -100.0));
    }
}
