use crate::models::instrument::InstrumentClass;

use super::frankfurter::FrankfurterProvider;
use super::traits::PriceProvider;
use super::yahoo_finance::YahooFinanceProvider;

/// Registry of all available price providers.
///
/// Routes requests to providers by `InstrumentClass`, in registration order,
/// so that the first one is primary and later ones are fallbacks.
pub struct PriceProviderRegistry {
    providers: Vec<Box<dyn PriceProvider>>,
}

impl PriceProviderRegistry {
    /// Create an empty registry (offline mode: every external lookup yields nothing).
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with all default providers pre-configured.
    pub fn new_with_defaults() -> Self {
        let mut registry = Self::new();

        // Yahoo Finance — securities and crypto, no API key needed
        match YahooFinanceProvider::new() {
            Ok(yahoo) => registry.register(Box::new(yahoo)),
            Err(e) => tracing::warn!(error = %e, "Yahoo Finance provider unavailable"),
        }

        // Frankfurter — ECB FX rates, no API key needed
        registry.register(Box::new(FrankfurterProvider::new()));

        registry
    }

    /// Register a new price provider.
    pub fn register(&mut self, provider: Box<dyn PriceProvider>) {
        self.providers.push(provider);
    }

    /// Find the first provider that supports the given class.
    pub fn get_provider_for(&self, class: InstrumentClass) -> Option<&dyn PriceProvider> {
        self.providers
            .iter()
            .find(|p| p.supported_classes().contains(&class))
            .map(|p| p.as_ref())
    }

    /// All providers supporting the given class, in priority order.
    pub fn get_providers_for(&self, class: InstrumentClass) -> Vec<&dyn PriceProvider> {
        self.providers
            .iter()
            .filter(|p| p.supported_classes().contains(&class))
            .map(|p| p.as_ref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for PriceProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
