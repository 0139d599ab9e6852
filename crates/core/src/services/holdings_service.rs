use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::event::ClassifiedEvent;
use crate::models::holdings::HoldingsTimeline;
use crate::models::instrument::InstrumentClass;
use crate::models::report::{Partial, SkippedRecord, Stage};

/// Replays share-moving events oldest-first into a per-instrument quantity timeline.
///
/// Pure business logic — no I/O, no API calls.
pub struct HoldingsService;

impl HoldingsService {
    pub fn new() -> Self {
        Self
    }

    /// Build the holdings timeline as of `as_of`.
    ///
    /// 1. Keep buy/sell/split/transfer events that carry a quantity
    ///    (bonds without `shares` use `|amount|` as nominal quantity)
    /// 2. Replay in timestamp order; sells clamp at the tracked balance
    /// 3. Record the end-of-day quantity on every changed date, plus `as_of`
    ///
    /// Instruments with no quantity-bearing events get no entry at all.
    pub fn build(&self, events: &[ClassifiedEvent], as_of: NaiveDate) -> Partial<HoldingsTimeline> {
        let mut result = Partial::new(HoldingsTimeline::new());

        let mut moves: Vec<(&ClassifiedEvent, &str, f64)> = Vec::new();
        for event in events.iter().filter(|e| e.kind.changes_holdings()) {
            let Some(instrument) = event.instrument.as_ref() else {
                result.skip(SkippedRecord::new(
                    Stage::Holdings,
                    event.id.clone(),
                    format!("{} without instrument identifier", event.kind),
                ));
                continue;
            };
            if event.date() > as_of {
                result.skip(SkippedRecord::new(
                    Stage::Holdings,
                    event.id.clone(),
                    format!("dated after {as_of}"),
                ));
                continue;
            }
            let quantity = match event.shares {
                Some(shares) => shares,
                // Nominal-value approximation for bond-like instruments.
                None if instrument.class == InstrumentClass::Bond && event.amount != 0.0 => {
                    event.amount.abs()
                }
                None => {
                    result.skip(SkippedRecord::new(
                        Stage::Holdings,
                        event.id.clone(),
                        format!("{} of {} without share quantity", event.kind, instrument.isin),
                    ));
                    continue;
                }
            };
            moves.push((event, instrument.isin.as_str(), quantity));
        }

        // Oldest first; reversing gives wrong intermediate balances.
        moves.sort_by_key(|(event, _, _)| event.timestamp);

        let mut running: BTreeMap<&str, f64> = BTreeMap::new();
        for (event, isin, quantity) in moves {
            let held = running.entry(isin).or_insert(0.0);
            if event.kind.reduces_holdings() {
                if quantity > *held {
                    debug!(
                        isin,
                        id = %event.id,
                        tracked = *held,
                        requested = quantity,
                        "sell exceeds tracked holdings, clamping to zero"
                    );
                }
                *held = (*held - quantity).max(0.0);
            } else {
                *held += quantity;
            }
            result.value.record(isin, event.date(), *held);
        }

        for (isin, held) in running {
            let last = result
                .value
                .series(isin)
                .and_then(|s| s.keys().next_back().copied());
            if last.is_some_and(|d| d < as_of) {
                result.value.record(isin, as_of, held);
            }
        }

        result
    }
}

impl Default for HoldingsService {
    fn default() -> Self {
        Self::new()
    }
}
