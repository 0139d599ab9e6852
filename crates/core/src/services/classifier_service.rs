use tracing::debug;

use crate::models::event::{ClassifiedEvent, Confidence, EventKind};
use crate::models::report::{Partial, SkippedRecord, Stage};
use crate::models::settings::Vocabulary;
use crate::models::transaction::RawTransaction;

/// Reason prefix for transactions that matched no vocabulary entry.
pub const UNCLASSIFIED_REASON: &str = "unclassified";

/// Tags raw broker transactions with a semantic [`EventKind`].
///
/// Pure closed-vocabulary matching over title/subtitle/amount. Anything the
/// vocabulary does not cover becomes `Other`, which every downstream builder
/// ignores; that is a silent skip, not an error.
pub struct ClassifierService {
    vocabulary: Vocabulary,
}

impl ClassifierService {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    /// Classify a single transaction.
    pub fn classify(&self, txn: &RawTransaction) -> (EventKind, Confidence) {
        let v = &self.vocabulary;
        let title = txn.title_text();
        let subtitle = txn.subtitle_text();
        let amount = txn.amount.unwrap_or(0.0);

        let in_set = |set: &[String], value: Option<&str>| {
            value.is_some_and(|s| set.iter().any(|item| item == s))
        };

        if in_set(&v.rejected_subtitles, subtitle) {
            return (EventKind::Other, Confidence::High);
        }
        if in_set(&v.buy_subtitles, subtitle) {
            return (EventKind::Buy, Confidence::High);
        }
        if in_set(&v.sell_subtitles, subtitle) {
            return (EventKind::Sell, Confidence::High);
        }
        if in_set(&v.split_subtitles, subtitle) {
            return (EventKind::Split, Confidence::High);
        }
        if in_set(&v.transfer_in_subtitles, subtitle) {
            return (EventKind::TransferIn, Confidence::High);
        }
        if in_set(&v.transfer_out_subtitles, subtitle) {
            return (EventKind::TransferOut, Confidence::High);
        }
        if in_set(&v.dividend_subtitles, subtitle) && amount > 0.0 {
            return (EventKind::Dividend, Confidence::High);
        }

        let interest_pattern = subtitle.is_some_and(|s| {
            v.interest_subtitle_patterns
                .iter()
                .any(|pattern| s.contains(pattern.as_str()))
        });
        if (in_set(&v.interest_titles, title)
            || in_set(&v.interest_subtitles, subtitle)
            || interest_pattern)
            && amount > 0.0
        {
            return (EventKind::Interest, Confidence::High);
        }

        if in_set(&v.tax_titles, title) || in_set(&v.tax_subtitles, subtitle) {
            return (EventKind::Tax, Confidence::High);
        }
        if in_set(&v.fee_labels, subtitle) || in_set(&v.fee_labels, title) {
            return (EventKind::Fee, Confidence::High);
        }

        if in_set(&v.deposit_titles, title) && amount > 0.0 {
            return (EventKind::Deposit, Confidence::High);
        }
        if in_set(&v.deposit_subtitles, subtitle) && amount > 0.0 {
            return (EventKind::Deposit, Confidence::High);
        }
        if in_set(&v.withdrawal_subtitles, subtitle) && amount < 0.0 {
            return (EventKind::Withdrawal, Confidence::High);
        }

        // Legacy P2P records carry the counterparty's name as title and no subtitle.
        if subtitle.is_none() && amount != 0.0 {
            if let Some(title) = title {
                if self.looks_like_person_name(title) {
                    let kind = if amount > 0.0 {
                        EventKind::Deposit
                    } else {
                        EventKind::Withdrawal
                    };
                    return (kind, Confidence::Low);
                }
            }
        }

        (EventKind::Other, Confidence::High)
    }

    /// Classify a whole timeline.
    ///
    /// Records without a parseable timestamp or amount are skipped with a reason;
    /// `Other` events are dropped from the output and counted by the caller.
    pub fn classify_all(&self, transactions: &[RawTransaction]) -> Partial<Vec<ClassifiedEvent>> {
        let mut result = Partial::new(Vec::with_capacity(transactions.len()));

        for txn in transactions {
            let label = txn.label();
            let Some(timestamp) = txn.parsed_timestamp() else {
                result.skip(SkippedRecord::new(
                    Stage::Classification,
                    label,
                    "missing or unparseable timestamp",
                ));
                continue;
            };
            let Some(amount) = txn.amount.filter(|a| a.is_finite()) else {
                result.skip(SkippedRecord::new(
                    Stage::Classification,
                    label,
                    "missing amount",
                ));
                continue;
            };

            let (kind, confidence) = self.classify(txn);
            if kind == EventKind::Other {
                debug!(
                    id = %label,
                    title = txn.title.as_deref().unwrap_or(""),
                    subtitle = txn.subtitle.as_deref().unwrap_or(""),
                    "transaction did not match the vocabulary"
                );
                result.skip(SkippedRecord::new(
                    Stage::Classification,
                    label,
                    format!(
                        "{UNCLASSIFIED_REASON} (title '{}', subtitle '{}')",
                        txn.title.as_deref().unwrap_or(""),
                        txn.subtitle.as_deref().unwrap_or("")
                    ),
                ));
                continue;
            }

            let shares = txn.shares.filter(|s| s.is_finite() && *s != 0.0).map(f64::abs);

            result.value.push(ClassifiedEvent {
                id: label,
                timestamp,
                kind,
                confidence,
                amount,
                currency: txn.currency.clone(),
                instrument: txn.instrument(),
                shares,
            });
        }

        result.value.sort_by_key(|e| e.timestamp);
        result
    }

    /// Heuristic for "First Last"-style titles. Lower confidence by construction.
    fn looks_like_person_name(&self, title: &str) -> bool {
        if self.vocabulary.system_titles.iter().any(|t| t == title) {
            return false;
        }
        let words: Vec<&str> = title.split_whitespace().collect();
        if !(2..=4).contains(&words.len()) {
            return false;
        }
        words.iter().all(|word| {
            let mut chars = word.chars();
            let starts_upper = chars.next().is_some_and(|c| c.is_uppercase());
            starts_upper
                && word
                    .chars()
                    .all(|c| c.is_alphabetic() || c == '-' || c == '.' || c == '\'')
                && (word.chars().any(|c| c.is_lowercase())
                    || (word.chars().count() == 2 && word.ends_with('.')))
        })
    }
}

impl Default for ClassifierService {
    fn default() -> Self {
        Self::new(Vocabulary::default())
    }
}
