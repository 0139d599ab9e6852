use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::instrument::{looks_like_isin, Instrument, InstrumentClass};

/// A transaction record as delivered by the brokerage timeline.
///
/// Every field is optional: old exports, partially enriched records and
/// broker format changes all produce holes, and none of them may abort a sync.
/// Records are never mutated after being fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTransaction {
    pub id: Option<String>,

    /// ISO-8601 timestamp (several broker dialects accepted, see [`parse_timestamp`])
    pub timestamp: Option<String>,

    pub title: Option<String>,

    /// Primary classification key (closed, broker-specific vocabulary)
    pub subtitle: Option<String>,

    pub event_type: Option<String>,

    /// Signed amount in account currency (negative = money leaving the account)
    pub amount: Option<f64>,

    pub currency: Option<String>,

    /// Broker icon path, e.g. `logos/IE00B4L5Y983/v2`
    pub icon: Option<String>,

    pub isin: Option<String>,

    pub shares: Option<f64>,

    pub instrument_type: Option<String>,

    /// Raw detail payload, kept verbatim
    pub details: Option<serde_json::Value>,
}

impl RawTransaction {
    /// Resolve the instrument identifier: explicit `isin` first, then the icon path.
    pub fn resolved_isin(&self) -> Option<String> {
        if let Some(isin) = self.isin.as_deref() {
            let isin = isin.trim().to_uppercase();
            if looks_like_isin(&isin) {
                return Some(isin);
            }
        }
        self.icon.as_deref().and_then(extract_isin_from_icon)
    }

    /// The instrument this transaction refers to, if any.
    pub fn instrument(&self) -> Option<Instrument> {
        let isin = self.resolved_isin()?;
        let class = InstrumentClass::infer(&isin, self.instrument_type.as_deref());
        Some(Instrument { isin, class })
    }

    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    /// Calendar date of the timestamp.
    pub fn date(&self) -> Option<NaiveDate> {
        self.parsed_timestamp().map(|ts| ts.date())
    }

    /// Trimmed, non-empty subtitle.
    pub fn subtitle_text(&self) -> Option<&str> {
        self.subtitle.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Trimmed, non-empty title.
    pub fn title_text(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Identifier used in skip reports; falls back to the timestamp.
    pub fn label(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.timestamp.clone())
            .unwrap_or_else(|| "<unidentified>".to_string())
    }
}

/// Extract an ISIN from an icon path like `logos/IE00B5BMR087/v2`.
pub fn extract_isin_from_icon(icon: &str) -> Option<String> {
    let start = icon.find("logos/")? + "logos/".len();
    let candidate = icon.get(start..start + 12)?;
    looks_like_isin(candidate).then(|| candidate.to_string())
}

/// Parse the timestamp dialects seen in broker exports.
///
/// Accepts RFC 3339, `+0000`-style offsets, naive date-times (with or without
/// fractional seconds) and bare dates. Offsets are dropped: the calendar date
/// is the one written in the record.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
