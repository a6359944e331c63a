use crate::domain::money::Money;
use crate::domain::ports::QuoteSource;
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Deterministic quote source for simulation and tests.
///
/// Un-pinned symbols get a base value derived from the symbol's bytes with
/// a small random jitter, so repeated queries return stable-ish prices.
/// `set_price` pins an exact value, which tests rely on.
#[derive(Debug, Default)]
pub struct MockQuoteSource {
    pinned: RwLock<HashMap<String, Money>>,
}

impl MockQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: Money) {
        self.pinned
            .write()
            .unwrap()
            .insert(symbol.to_ascii_uppercase(), price);
    }

    pub fn unset_price(&self, symbol: &str) {
        self.pinned.write().unwrap().remove(&symbol.to_ascii_uppercase());
    }

    /// Base value in a plausible equity range, stable per symbol.
    fn base_price(symbol: &str) -> f64 {
        let byte_sum: u32 = symbol.bytes().map(u32::from).sum();
        50.0 + f64::from(byte_sum % 1950)
    }
}

#[async_trait]
impl QuoteSource for MockQuoteSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<Money>> {
        let symbol = symbol.to_ascii_uppercase();
        if let Some(pinned) = self.pinned.read().unwrap().get(&symbol) {
            return Ok(Some(*pinned));
        }
        let jitter = rand::rng().random_range(-0.01..=0.01);
        let price = Self::base_price(&symbol) * (1.0 + jitter);
        Ok(Money::from_f64(price))
    }
}

struct CachedQuote {
    price: Money,
    fetched_at: Instant,
}

/// Resolves current prices per symbol through a TTL cache.
///
/// Live sources are tried in order and the provider degrades to the mock
/// source when all of them fail; degradation is logged, never fatal. The
/// cache lock is released while a source call is in flight
/// (fetch-then-insert), so a slow source never stalls unrelated readers.
pub struct PriceProvider {
    cache: Mutex<HashMap<String, CachedQuote>>,
    ttl: Duration,
    sources: Vec<Arc<dyn QuoteSource>>,
    mock: Arc<MockQuoteSource>,
}

impl PriceProvider {
    /// Mock-only provider.
    pub fn mock(ttl_secs: u64) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
            sources: Vec::new(),
            mock: Arc::new(MockQuoteSource::new()),
        }
    }

    /// Live provider with an optional secondary fallback. The mock source
    /// remains the final fallback either way.
    pub fn live(
        primary: Arc<dyn QuoteSource>,
        secondary: Option<Arc<dyn QuoteSource>>,
        ttl_secs: u64,
    ) -> Self {
        let mut sources = vec![primary];
        sources.extend(secondary);
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
            sources,
            mock: Arc::new(MockQuoteSource::new()),
        }
    }

    /// Pin an exact price in the mock source and refresh the cache entry
    /// so the new value is visible immediately.
    pub fn set_price(&self, symbol: &str, price: Money) {
        let symbol = symbol.to_ascii_uppercase();
        self.mock.set_price(&symbol, price);
        self.cache.lock().unwrap().insert(
            symbol,
            CachedQuote {
                price,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every cached entry, forcing a full refresh on next lookup.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    pub async fn get_price(&self, symbol: &str) -> Option<Money> {
        let symbol = symbol.to_ascii_uppercase();

        if !self.ttl.is_zero() {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(&symbol) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Some(entry.price);
                }
            }
        }

        // Cache miss: fetch with no lock held.
        let price = self.resolve(&symbol).await?;

        if !self.ttl.is_zero() {
            self.cache.lock().unwrap().insert(
                symbol,
                CachedQuote {
                    price,
                    fetched_at: Instant::now(),
                },
            );
        }
        Some(price)
    }

    /// Batched lookup; symbols that resolve to nothing are omitted.
    pub async fn get_prices(&self, symbols: &[String]) -> HashMap<String, Money> {
        let mut prices = HashMap::new();
        for symbol in symbols {
            if let Some(price) = self.get_price(symbol).await {
                prices.insert(symbol.to_ascii_uppercase(), price);
            }
        }
        prices
    }

    async fn resolve(&self, symbol: &str) -> Option<Money> {
        for source in &self.sources {
            match source.latest_price(symbol).await {
                Ok(Some(price)) => {
                    debug!("{}: {} from '{}'", symbol, price, source.name());
                    return Some(price);
                }
                Ok(None) => {
                    warn!("Quote source '{}' has no price for {}", source.name(), symbol);
                }
                Err(e) => {
                    warn!("Quote source '{}' failed for {}: {e:#}", source.name(), symbol);
                }
            }
        }
        if !self.sources.is_empty() {
            warn!("All live sources failed for {}, degrading to mock", symbol);
        }
        match self.mock.latest_price(symbol).await {
            Ok(price) => price,
            Err(_) => None,
        }
    }
}
