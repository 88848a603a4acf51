use crate::clock::Clock;
use crate::data::TokenPrice;
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub price: TokenPrice,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        let age = now - self.stored_at;
        age >= TimeDelta::zero() && age < ttl
    }
}

/// Per-symbol price cache. An entry is served only while it is younger than the TTL,
/// anything older behaves exactly like a missing entry.
pub struct PriceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn get(&self, symbol: &str) -> Option<TokenPrice> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        match entries.get(symbol) {
            Some(entry) if entry.is_fresh(now, self.ttl) => Some(entry.price.clone()),
            Some(_) => {
                debug!("Cache entry for {symbol} is stale");
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, symbol: &str, price: TokenPrice) {
        let entry = CacheEntry {
            price,
            stored_at: self.clock.now(),
        };
        self.entries.write().await.insert(symbol.to_string(), entry);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
