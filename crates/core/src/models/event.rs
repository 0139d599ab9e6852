use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::instrument::Instrument;

/// Semantic kind of a transaction, assigned once by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Buy,
    Sell,
    Deposit,
    Withdrawal,
    Dividend,
    Interest,
    Tax,
    Fee,
    /// Extra shares booked by a stock split
    Split,
    TransferIn,
    TransferOut,
    /// Unmatched or rejected; excluded from every series
    Other,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventKind::Buy => "Buy",
            EventKind::Sell => "Sell",
            EventKind::Deposit => "Deposit",
            EventKind::Withdrawal => "Withdrawal",
            EventKind::Dividend => "Dividend",
            EventKind::Interest => "Interest",
            EventKind::Tax => "Tax",
            EventKind::Fee => "Fee",
            EventKind::Split => "Split",
            EventKind::TransferIn => "TransferIn",
            EventKind::TransferOut => "TransferOut",
            EventKind::Other => "Other",
        };
        write!(f, "{label}")
    }
}

impl EventKind {
    /// Kinds that move shares in or out of the depot.
    pub fn changes_holdings(&self) -> bool {
        matches!(
            self,
            EventKind::Buy
                | EventKind::Sell
                | EventKind::Split
                | EventKind::TransferIn
                | EventKind::TransferOut
        )
    }

    /// Kinds that remove shares from the depot.
    pub fn reduces_holdings(&self) -> bool {
        matches!(self, EventKind::Sell | EventKind::TransferOut)
    }
}

/// How the classifier arrived at a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Matched against the closed broker vocabulary
    High,
    /// Matched by the legacy person-name heuristic
    Low,
}

/// A transaction tagged with its semantic kind.
///
/// Built once by the classifier; downstream builders never look at the
/// raw title/subtitle strings again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
    pub confidence: Confidence,

    /// Signed amount in account currency
    pub amount: f64,

    pub currency: Option<String>,

    pub instrument: Option<Instrument>,

    /// Share quantity, always positive when present
    pub shares: Option<f64>,
}

impl ClassifiedEvent {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn isin(&self) -> Option<&str> {
        self.instrument.as_ref().map(|i| i.isin.as_str())
    }

    /// Effect of this event on the cash balance, or `None` when it has none.
    ///
    /// Fees count as outflows; splits and depot transfers move no cash.
    pub fn cash_delta(&self) -> Option<f64> {
        let magnitude = self.amount.abs();
        match self.kind {
            EventKind::Deposit
            | EventKind::Dividend
            | EventKind::Interest
            | EventKind::Sell => Some(magnitude),
            EventKind::Withdrawal | EventKind::Buy | EventKind::Fee => Some(-magnitude),
            // Tax corrections can be refunds: keep the broker's sign.
            EventKind::Tax => Some(self.amount),
            EventKind::Split
            | EventKind::TransferIn
            | EventKind::TransferOut
            | EventKind::Other => None,
        }
    }

    /// Externally contributed capital carried by this event, or `None`.
    ///
    /// Only high-confidence deposits and withdrawals count.
    pub fn capital_delta(&self) -> Option<f64> {
        if self.confidence != Confidence::High {
            return None;
        }
        match self.kind {
            EventKind::Deposit => Some(self.amount.abs()),
            EventKind::Withdrawal => Some(-self.amount.abs()),
            _ => None,
        }
    }
}
