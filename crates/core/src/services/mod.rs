pub mod benchmark_service;
pub mod cash_service;
pub mod classifier_service;
pub mod currency_service;
pub mod holdings_service;
pub mod invested_service;
pub mod performance_service;
pub mod price_history_service;
pub mod price_service;
pub mod reconciliation_service;
pub mod valuation_service;
