use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::CoreError;

/// Reconstruction settings. Every field has a default, so partial JSON files are valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Account currency all amounts are expressed in (e.g., "EUR").
    pub account_currency: String,

    /// Quantity tolerance used by reconciliation (units).
    pub reconciliation_epsilon: f64,

    /// Spacing of the regular price grid in days.
    pub price_grid_step_days: u32,

    /// Lower clamp for a single TWR period return (fraction, e.g. -0.5).
    pub twr_period_floor: f64,

    /// Upper clamp for a single TWR period return (fraction, e.g. 1.0).
    pub twr_period_cap: f64,

    /// Wall-clock limit for one brokerage job.
    pub fetch_timeout_secs: u64,

    /// Safety limit on timeline pages per fetch.
    pub max_timeline_pages: usize,

    /// Forward-fill the valuation history to daily frequency before TWR/drawdown.
    pub daily_gap_fill: bool,

    /// Optional API keys per provider (e.g., "openfigi").
    pub api_keys: HashMap<String, String>,

    /// Broker vocabulary used by the classifier.
    pub vocabulary: Vocabulary,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account_currency: "EUR".to_string(),
            reconciliation_epsilon: 0.001,
            price_grid_step_days: 7,
            twr_period_floor: -0.5,
            twr_period_cap: 1.0,
            fetch_timeout_secs: 90,
            max_timeline_pages: 100,
            daily_gap_fill: true,
            api_keys: HashMap::new(),
            vocabulary: Vocabulary::default(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.account_currency.len() != 3
            || !self.account_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(CoreError::ValidationError(format!(
                "account currency must be a 3-letter code, got '{}'",
                self.account_currency
            )));
        }
        if !(self.reconciliation_epsilon > 0.0) {
            return Err(CoreError::ValidationError(
                "reconciliation epsilon must be positive".into(),
            ));
        }
        if self.price_grid_step_days == 0 {
            return Err(CoreError::ValidationError(
                "price grid step must be at least one day".into(),
            ));
        }
        if !(self.twr_period_floor > -1.0 && self.twr_period_floor <= 0.0) {
            return Err(CoreError::ValidationError(format!(
                "TWR period floor must be in (-1, 0], got {}",
                self.twr_period_floor
            )));
        }
        if !(self.twr_period_cap > 0.0) {
            return Err(CoreError::ValidationError(format!(
                "TWR period cap must be positive, got {}",
                self.twr_period_cap
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(CoreError::ValidationError(
                "fetch timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Upper-cased account currency.
    pub fn currency(&self) -> String {
        self.account_currency.to_uppercase()
    }
}

/// Closed sets of broker strings the classifier matches against.
///
/// Defaults are the Trade Republic (German) timeline vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub buy_subtitles: Vec<String>,
    pub sell_subtitles: Vec<String>,
    pub deposit_titles: Vec<String>,
    /// Completed incoming transfers
    pub deposit_subtitles: Vec<String>,
    pub withdrawal_subtitles: Vec<String>,
    pub dividend_subtitles: Vec<String>,
    pub interest_titles: Vec<String>,
    pub interest_subtitles: Vec<String>,
    /// Substrings for variable subtitles such as "3,25 % p.a."
    pub interest_subtitle_patterns: Vec<String>,
    pub tax_titles: Vec<String>,
    pub tax_subtitles: Vec<String>,
    pub fee_labels: Vec<String>,
    pub split_subtitles: Vec<String>,
    pub transfer_in_subtitles: Vec<String>,
    pub transfer_out_subtitles: Vec<String>,
    /// Rejected or failed orders; always `Other`
    pub rejected_subtitles: Vec<String>,
    /// Titles that are system labels even though they look like names
    pub system_titles: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            buy_subtitles: strings(&[
                "Kauforder",
                "Sparplan ausgeführt",
                "Limit-Buy-Order",
                "Bonusaktien",
                "Tausch",
            ]),
            sell_subtitles: strings(&["Verkaufsorder", "Limit-Sell-Order", "Stop-Sell-Order"]),
            deposit_titles: strings(&["Einzahlung"]),
            deposit_subtitles: strings(&["Fertig"]),
            withdrawal_subtitles: strings(&["Gesendet"]),
            dividend_subtitles: strings(&["Bardividende", "Dividende"]),
            interest_titles: strings(&["Zinsen"]),
            interest_subtitles: strings(&["Festzins", "Zinszahlung"]),
            interest_subtitle_patterns: strings(&["% p.a.", "1 % Bonus"]),
            tax_titles: strings(&["Steuerkorrektur"]),
            tax_subtitles: strings(&["Vorabpauschale"]),
            fee_labels: strings(&["Gebühr", "Ordergebühr", "Kartengebühr"]),
            split_subtitles: strings(&["Aktiensplit", "Split"]),
            transfer_in_subtitles: strings(&["Depotübertrag eingehend", "Einbuchung"]),
            transfer_out_subtitles: strings(&["Depotübertrag ausgehend", "Ausbuchung"]),
            rejected_subtitles: strings(&[
                "Abgelehnt",
                "Sparplan fehlgeschlagen",
                "Storniert",
                "Abgebrochen",
            ]),
            system_titles: strings(&[
                "Einzahlung",
                "Auszahlung",
                "Zinsen",
                "Steuerkorrektur",
                "Trade Republic",
                "Kartenzahlung",
            ]),
        }
    }
}
