//! REST Adapters
//!
//! Price providers and the order RPC client, both over `reqwest`.

pub mod binance;
pub mod supabase;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use binance::{
    BINANCE_COM, BINANCE_COM_API_URL, BINANCE_US, BINANCE_US_API_URL, BinanceRestProvider,
};
pub use supabase::{PLACE_ORDER_RPC, SupabaseRpcClient};

use crate::application::ports::{PriceProvider, ProviderError};
use crate::infrastructure::config::ProviderSettings;

/// Price providers addressable by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn PriceProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `binance_com` and `binance_us` from settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn binance(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let com = BinanceRestProvider::new(
            BINANCE_COM,
            settings.binance_com_url.clone(),
            settings.http_timeout,
        )?;
        let us = BinanceRestProvider::new(
            BINANCE_US,
            settings.binance_us_url.clone(),
            settings.http_timeout,
        )?;

        Ok(Self::new()
            .with_provider(BINANCE_COM, Arc::new(com))
            .with_provider(BINANCE_US, Arc::new(us)))
    }

    /// Register `provider` under `name`, replacing any previous one.
    #[must_use]
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn PriceProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    /// Provider registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn PriceProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
