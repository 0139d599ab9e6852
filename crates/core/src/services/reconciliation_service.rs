use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::models::event::ClassifiedEvent;
use crate::models::holdings::{AdjustmentRecord, HoldingsTimeline, ReconciliationAdjustment};
use crate::models::instrument::Instrument;
use crate::models::report::Residual;

/// Result of reconciling a reconstructed timeline against broker positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub timeline: HoldingsTimeline,
    pub adjustments: Vec<ReconciliationAdjustment>,
    /// Log entries for `adjustments`, in the same order
    pub records: Vec<AdjustmentRecord>,
    pub residuals: Vec<Residual>,
}

/// Aligns the reconstructed holdings with the broker's current positions.
///
/// Heuristic by nature: a quantity mismatch on a held instrument is always
/// treated as a split-like ratio, whether it came from a real split, rounding,
/// or a missed transaction.
pub struct ReconciliationService {
    epsilon: f64,
}

impl ReconciliationService {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Reconcile `computed` against `ground_truth` (ISIN → quantity held now).
    ///
    /// `fallback_date` is used as the effective date of added positions when
    /// the timeline has no dates at all.
    pub fn reconcile(
        &self,
        computed: &HoldingsTimeline,
        ground_truth: &BTreeMap<String, f64>,
        fallback_date: NaiveDate,
    ) -> Reconciliation {
        let eps = self.epsilon;
        let mut timeline = computed.clone();
        let mut adjustments = Vec::new();
        let mut records = Vec::new();

        let truth = |isin: &str| ground_truth.get(isin).copied().unwrap_or(0.0);

        let mut isins: BTreeSet<String> = computed.isins().map(str::to_string).collect();
        isins.extend(ground_truth.keys().cloned());

        // Instruments already transplanted to a new id cannot be matched twice.
        let mut consumed: BTreeSet<String> = BTreeSet::new();
        let all_dates = computed.all_dates();
        let earliest = computed.earliest_date().unwrap_or(fallback_date);

        for isin in &isins {
            let expected = truth(isin);
            let held = computed.final_quantity(isin);

            if expected <= eps {
                // Held but not reported: assumed sold or transferred out.
                continue;
            }

            if held > eps {
                if (expected - held).abs() > eps {
                    let multiplier = expected / held;
                    info!(isin = %isin, held, expected, multiplier, "applying ratio adjustment");
                    timeline.scale(isin, multiplier);
                    let adjustment = ReconciliationAdjustment::Ratio {
                        isin: isin.clone(),
                        multiplier,
                    };
                    records.push(AdjustmentRecord::new(adjustment.clone(), held, expected));
                    adjustments.push(adjustment);
                }
                continue;
            }

            let renamed_from = computed
                .isins()
                .filter(|candidate| *candidate != isin.as_str())
                .filter(|candidate| !consumed.contains(*candidate))
                .filter(|candidate| truth(candidate) <= eps)
                .find(|candidate| (computed.final_quantity(candidate) - expected).abs() <= eps)
                .map(str::to_string);

            let adjustment = match renamed_from {
                Some(old_isin) => {
                    info!(old = %old_isin, new = %isin, quantity = expected, "applying ISIN change");
                    timeline.rename(&old_isin, isin);
                    consumed.insert(old_isin.clone());
                    ReconciliationAdjustment::IsinChange {
                        old_isin,
                        new_isin: isin.clone(),
                        quantity: expected,
                    }
                }
                None => {
                    info!(
                        isin = %isin,
                        quantity = expected,
                        from = %earliest,
                        "backfilling untracked position"
                    );
                    timeline.backfill_constant(isin, expected, earliest, &all_dates);
                    ReconciliationAdjustment::AddPosition {
                        isin: isin.clone(),
                        quantity: expected,
                        effective_date: earliest,
                    }
                }
            };
            records.push(AdjustmentRecord::new(adjustment.clone(), held, expected));
            adjustments.push(adjustment);
        }

        let residuals: Vec<Residual> = ground_truth
            .iter()
            .filter(|(_, expected)| **expected > eps)
            .filter_map(|(isin, expected)| {
                let computed = timeline.final_quantity(isin);
                ((computed - expected).abs() >= eps || !computed.is_finite()).then(|| Residual {
                    isin: isin.clone(),
                    computed,
                    ground_truth: *expected,
                })
            })
            .collect();
        for residual in &residuals {
            warn!(
                isin = %residual.isin,
                computed = residual.computed,
                ground_truth = residual.ground_truth,
                "position still mismatched after reconciliation"
            );
        }

        Reconciliation {
            timeline,
            adjustments,
            records,
            residuals,
        }
    }

    /// Re-key events of renamed instruments to their new ISIN so their
    /// execution prices follow the transplanted holdings.
    pub fn rename_instruments(
        &self,
        events: &[ClassifiedEvent],
        adjustments: &[ReconciliationAdjustment],
    ) -> Vec<ClassifiedEvent> {
        let renames: BTreeMap<&str, &str> = adjustments
            .iter()
            .filter_map(|a| match a {
                ReconciliationAdjustment::IsinChange {
                    old_isin, new_isin, ..
                } => Some((old_isin.as_str(), new_isin.as_str())),
                _ => None,
            })
            .collect();
        if renames.is_empty() {
            return events.to_vec();
        }

        events
            .iter()
            .cloned()
            .map(|mut event| {
                if let Some(instrument) = event.instrument.as_mut() {
                    if let Some(new_isin) = renames.get(instrument.isin.as_str()) {
                        *instrument = Instrument::new(*new_isin, instrument.class);
                    }
                }
                event
            })
            .collect()
    }
}

impl Default for ReconciliationService {
    fn default() -> Self {
        Self::new(0.001)
    }
}
