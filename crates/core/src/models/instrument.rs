use serde::{Deserialize, Serialize};

/// The class of a traded instrument.
/// Determines which price provider is consulted and how a missing
/// share quantity is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentClass {
    /// Stocks, ETFs, funds — priced via Yahoo Finance
    Security,
    /// Broker-internal crypto ISINs (`XF000…`)
    Crypto,
    /// Bonds and bond-like notes; may be booked by nominal value
    Bond,
    /// Fiat currencies — only used to route FX rate requests
    Fiat,
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentClass::Security => write!(f, "Security"),
            InstrumentClass::Crypto => write!(f, "Crypto"),
            InstrumentClass::Bond => write!(f, "Bond"),
            InstrumentClass::Fiat => write!(f, "Fiat"),
        }
    }
}

impl InstrumentClass {
    /// Infer the class from an ISIN and the broker's optional instrument type label.
    pub fn infer(isin: &str, instrument_type: Option<&str>) -> Self {
        let kind = instrument_type.map(|t| t.trim().to_ascii_lowercase());
        match kind.as_deref() {
            Some("crypto") => return InstrumentClass::Crypto,
            Some("bond") => return InstrumentClass::Bond,
            _ => {}
        }
        if isin.starts_with("XF000") {
            InstrumentClass::Crypto
        } else if isin.starts_with("XS") {
            InstrumentClass::Bond
        } else {
            InstrumentClass::Security
        }
    }
}

/// An instrument as referenced by a transaction: ISIN plus inferred class.
///
/// Equality and hashing use the ISIN only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub isin: String,
    pub class: InstrumentClass,
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.isin == other.isin
    }
}

impl Eq for Instrument {}

impl std::hash::Hash for Instrument {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.isin.hash(state);
    }
}

impl Instrument {
    pub fn new(isin: impl Into<String>, class: InstrumentClass) -> Self {
        Self {
            isin: isin.into().trim().to_uppercase(),
            class,
        }
    }

    /// Build an instrument, inferring the class from the ISIN alone.
    pub fn from_isin(isin: impl Into<String>) -> Self {
        let isin = isin.into().trim().to_uppercase();
        let class = InstrumentClass::infer(&isin, None);
        Self { isin, class }
    }
}

/// Whether `candidate` has the shape of an ISIN: 12 uppercase ASCII letters or digits,
/// the first two being letters.
pub fn looks_like_isin(candidate: &str) -> bool {
    candidate.len() == 12
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && candidate.chars().take(2).all(|c| c.is_ascii_uppercase())
}
