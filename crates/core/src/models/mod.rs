pub mod cache;
pub mod event;
pub mod holdings;
pub mod instrument;
pub mod price;
pub mod report;
pub mod series;
pub mod settings;
pub mod snapshot;
pub mod transaction;
pub mod valuation;
