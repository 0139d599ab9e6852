use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::holdings::AdjustmentRecord;
use super::price::PriceCache;
use super::snapshot::PortfolioSnapshot;
use super::transaction::RawTransaction;
use super::valuation::{PerformanceSeries, ValuationPoint};

/// Current on-disk cache format version.
pub const CACHE_VERSION: u16 = 1;

/// Everything persisted for one end-user. Serialized as JSON.
///
/// All reconstructed series are rebuilt from `transactions` on every
/// recalculation; only the transaction list is merged incrementally and
/// only the adjustment log is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCache {
    pub version: u16,

    pub user_id: String,

    /// Presentation only; never used to decide what to fetch.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,

    /// Raw timeline, newest first, unique by id
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,

    #[serde(default)]
    pub snapshot: Option<PortfolioSnapshot>,

    #[serde(default)]
    pub history: Vec<ValuationPoint>,

    #[serde(default)]
    pub performance: Option<PerformanceSeries>,

    #[serde(default)]
    pub price_cache: PriceCache,

    #[serde(default)]
    pub adjustment_log: Vec<AdjustmentRecord>,
}

impl UserCache {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            version: CACHE_VERSION,
            user_id: user_id.into(),
            last_sync: None,
            transactions: Vec::new(),
            snapshot: None,
            history: Vec::new(),
            performance: None,
            price_cache: PriceCache::new(),
            adjustment_log: Vec::new(),
        }
    }
}
