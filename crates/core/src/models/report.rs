use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::holdings::ReconciliationAdjustment;
use super::valuation::PerformanceMetrics;

/// Pipeline stage that dropped a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classification,
    Holdings,
    Prices,
    Valuation,
}

/// A record (transaction, instrument or date) left out of a series, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub stage: Stage,
    pub id: String,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(stage: Stage, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage,
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// A computed value together with everything that had to be skipped to compute it.
#[derive(Debug, Clone, PartialEq)]
pub struct Partial<T> {
    pub value: T,
    pub skipped: Vec<SkippedRecord>,
}

impl<T> Partial<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            skipped: Vec::new(),
        }
    }

    pub fn skip(&mut self, record: SkippedRecord) {
        tracing::debug!(stage = ?record.stage, id = %record.id, reason = %record.reason, "skipped record");
        self.skipped.push(record);
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U> {
        Partial {
            value: f(self.value),
            skipped: self.skipped,
        }
    }
}

/// A ground-truth position the reconstruction could not match after adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residual {
    pub isin: String,
    pub computed: f64,
    pub ground_truth: f64,
}

/// Matched-vs-unmatched counts for one reconstruction run.
///
/// This is the user-facing failure surface: degraded data is reported
/// here instead of as an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_transactions: usize,
    pub classified: usize,
    /// Classified as `Other` (rejected or unknown vocabulary)
    pub unmatched: usize,
    /// Deposits/withdrawals matched by the person-name heuristic
    pub low_confidence: usize,
    pub instruments: usize,
    pub priced_from_transactions: usize,
    pub priced_externally: usize,
    pub unpriced: usize,
    /// Reconstructed cash minus broker-reported cash, if both are known
    pub cash_gap: Option<f64>,
    pub residuals: Vec<Residual>,
    pub skipped: Vec<SkippedRecord>,
}

impl ValidationSummary {
    pub fn skipped_in(&self, stage: Stage) -> usize {
        self.skipped.iter().filter(|s| s.stage == stage).count()
    }
}

/// Outcome of one `recalculate` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub summary: ValidationSummary,
    pub adjustments: Vec<ReconciliationAdjustment>,
    pub metrics: PerformanceMetrics,
    pub points: usize,
    /// True when the transaction fetch failed and cached data was used
    pub used_cached_transactions: bool,
}
