pub mod cache_store;
pub mod encryption;
pub mod format;
pub mod vault;
