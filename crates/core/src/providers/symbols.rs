use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::CoreError;

const OPENFIGI_URL: &str = "https://api.openfigi.com/v3/mapping";
const PROVIDER: &str = "OpenFIGI";

/// A ticker a provider understands, plus the currency it is quoted in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub ticker: String,
    pub currency: String,
}

impl Listing {
    pub fn new(ticker: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            currency: currency.into().to_uppercase(),
        }
    }
}

/// Known listings that lookup services get wrong or do not cover.
/// US ISINs in particular cannot be searched on Yahoo directly.
const KNOWN_LISTINGS: &[(&str, &str, &str)] = &[
    // US equities (USD)
    ("US0378331005", "AAPL", "USD"),
    ("US5949181045", "MSFT", "USD"),
    ("US02079K3059", "GOOGL", "USD"),
    ("US0231351067", "AMZN", "USD"),
    ("US67066G1040", "NVDA", "USD"),
    ("US88160R1014", "TSLA", "USD"),
    ("US30303M1027", "META", "USD"),
    ("US0846707026", "BRK-B", "USD"),
    ("US1912161007", "KO", "USD"),
    ("US8740391003", "TSM", "USD"),
    ("US46625H1005", "JPM", "USD"),
    // Foreign equities
    ("DE0007164600", "SAP.DE", "EUR"),
    ("DE0007236101", "SIE.DE", "EUR"),
    ("DE0008404005", "ALV.DE", "EUR"),
    ("DE0007030009", "RHM.DE", "EUR"),
    ("NL0010273215", "ASML.AS", "EUR"),
    ("FR0000121014", "MC.PA", "EUR"),
    ("GB0002374006", "DGE.L", "GBP"),
    ("JP3436100006", "9984.T", "JPY"),
    ("DK0010268606", "NOVO-B.CO", "DKK"),
    // ETFs listed under their ISIN
    ("IE00B4L5Y983", "IE00B4L5Y983", "USD"),
    ("IE00B5BMR087", "IE00B5BMR087", "EUR"),
    ("IE00BK5BQT80", "IE00BK5BQT80", "EUR"),
    ("LU0274211480", "LU0274211480", "EUR"),
    // Broker-internal crypto ISINs
    ("XF000BTC0017", "BTC-EUR", "EUR"),
    ("XF000ETH0019", "ETH-EUR", "EUR"),
    ("XF000SOL0012", "SOL-EUR", "EUR"),
    ("XF000XRP0018", "XRP-EUR", "EUR"),
];

/// Exchange code → (Yahoo suffix, quote currency), for OpenFIGI results.
const EXCHANGES: &[(&str, &str, &str)] = &[
    ("US", "", "USD"),
    ("GY", ".DE", "EUR"),
    ("GR", ".DE", "EUR"),
    ("GF", ".F", "EUR"),
    ("NA", ".AS", "EUR"),
    ("FP", ".PA", "EUR"),
    ("LN", ".L", "GBP"),
    ("SW", ".SW", "CHF"),
];

#[derive(Deserialize)]
struct FigiResult {
    #[serde(default)]
    data: Vec<FigiInstrument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FigiInstrument {
    ticker: Option<String>,
    exch_code: Option<String>,
}

/// Maps ISINs to provider tickers.
///
/// Order: user overrides, the built-in table, then an OpenFIGI lookup.
/// Answers (including "not found") are memoised for the resolver's lifetime;
/// failed lookups are not, so the next sync asks again.
pub struct SymbolResolver {
    client: Option<Client>,
    endpoint: String,
    api_key: Option<String>,
    overrides: HashMap<String, Listing>,
    memo: Mutex<HashMap<String, Option<Listing>>>,
}

impl SymbolResolver {
    /// Resolver that may query OpenFIGI for unknown ISINs.
    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client: Some(client),
            endpoint: OPENFIGI_URL.to_string(),
            api_key,
            overrides: HashMap::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver limited to the built-in table and overrides.
    pub fn offline() -> Self {
        Self {
            client: None,
            endpoint: OPENFIGI_URL.to_string(),
            api_key: None,
            overrides: HashMap::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace a listing for an ISIN.
    pub fn with_listing(mut self, isin: &str, listing: Listing) -> Self {
        self.overrides.insert(isin.to_uppercase(), listing);
        self
    }

    /// Point lookups at another OpenFIGI-compatible mapping endpoint.
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Whether `isin` has a memoised lookup answer.
    pub fn is_memoised(&self, isin: &str) -> bool {
        self.memo
            .lock()
            .is_ok_and(|memo| memo.contains_key(&isin.to_uppercase()))
    }

    /// Listing from overrides or the built-in table, without network access.
    pub fn known_listing(&self, isin: &str) -> Option<Listing> {
        let isin = isin.to_uppercase();
        if let Some(listing) = self.overrides.get(&isin) {
            return Some(listing.clone());
        }
        KNOWN_LISTINGS
            .iter()
            .find(|(known, _, _)| *known == isin)
            .map(|(_, ticker, currency)| Listing::new(*ticker, *currency))
    }

    /// Resolve an ISIN to a listing. `None` when unknown or the lookup failed.
    pub async fn resolve(&self, isin: &str) -> Option<Listing> {
        if let Some(listing) = self.known_listing(isin) {
            return Some(listing);
        }
        let isin = isin.to_uppercase();
        let memoised = self
            .memo
            .lock()
            .ok()
            .and_then(|memo| memo.get(&isin).cloned());
        if let Some(cached) = memoised {
            return cached;
        }

        match self.lookup_openfigi(&isin).await {
            Ok(resolved) => {
                if resolved.is_none() {
                    debug!(isin = %isin, "no listing found");
                }
                if let Ok(mut memo) = self.memo.lock() {
                    memo.insert(isin, resolved.clone());
                }
                resolved
            }
            Err(e) => {
                warn!(isin = %isin, error = %e, "ISIN lookup failed, will retry next time");
                None
            }
        }
    }

    async fn lookup_openfigi(&self, isin: &str) -> Result<Option<Listing>, CoreError> {
        let Some(client) = self.client.as_ref() else {
            return Ok(None);
        };

        let body = serde_json::json!([{ "idType": "ID_ISIN", "idValue": isin }]);
        let mut request = client.post(&self.endpoint).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.header("X-OPENFIGI-APIKEY", key);
        }

        let results: Vec<FigiResult> = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("Failed to parse mapping for {isin}: {e}"),
            })?;

        let instruments = results.into_iter().flat_map(|r| r.data);
        Ok(Self::pick_listing(instruments))
    }

    /// Prefer the exchange listed first in `EXCHANGES`.
    fn pick_listing(instruments: impl Iterator<Item = FigiInstrument>) -> Option<Listing> {
        let candidates: Vec<(usize, Listing)> = instruments
            .filter_map(|inst| {
                let ticker = inst.ticker?;
                let exch = inst.exch_code?;
                let (rank, (_, suffix, currency)) = EXCHANGES
                    .iter()
                    .enumerate()
                    .find(|(_, (code, _, _))| *code == exch)?;
                let ticker = format!("{}{}", ticker.replace('/', "-"), suffix);
                Some((rank, Listing::new(ticker, *currency)))
            })
            .collect();
        candidates
            .into_iter()
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, listing)| listing)
    }
}

impl Default for SymbolResolver {
    fn default() -> Self {
        Self::offline()
    }
}
