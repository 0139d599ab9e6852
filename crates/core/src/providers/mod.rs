pub mod registry;
pub mod symbols;
pub mod traits;

// API provider implementations
pub mod frankfurter;
pub mod yahoo_finance;
