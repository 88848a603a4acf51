use crate::cache::PriceCache;
use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::data::{MarketSummary, PriceStatus, TokenData};
use crate::scraper::{Scraper, parse_market_data};
use chrono::TimeDelta;
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TokenServiceError {
    #[error("unknown token symbol {0}")]
    UnknownSymbol(String),
}

/// Best-effort market data for the configured tokens.
///
/// A known symbol always yields data: a fresh cache entry if there is one, otherwise a
/// single fetch from the token's source, otherwise the token's configured fallback.
pub struct TokenPriceService<S: Scraper> {
    tokens: Vec<TokenConfig>,
    scraper: S,
    cache: PriceCache,
}

impl<S: Scraper> TokenPriceService<S> {
    pub fn new(
        tokens: Vec<TokenConfig>,
        scraper: S,
        ttl: TimeDelta,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            scraper,
            cache: PriceCache::new(ttl, clock),
        }
    }

    pub async fn get_data(&self, symbol: &str) -> Result<TokenData, TokenServiceError> {
        let token = self
            .tokens
            .iter()
            .find(|token| token.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| TokenServiceError::UnknownSymbol(symbol.to_string()))?;

        Ok(self.data_for(token).await)
    }

    pub async fn get_all_data(&self) -> Vec<TokenData> {
        join_all(self.tokens.iter().map(|token| self.data_for(token))).await
    }

    pub async fn get_market_summary(&self) -> MarketSummary {
        let tokens = self.get_all_data().await;
        MarketSummary::from_tokens(&tokens, self.cache.now().timestamp_millis())
    }

    pub async fn clear_cache(&self) {
        let cleared = self.cache.len().await;
        self.cache.clear().await;
        debug!("Cleared {cleared} cached prices");
    }

    async fn data_for(&self, token: &TokenConfig) -> TokenData {
        let symbol = &token.symbol;
        if let Some(price) = self.cache.get(symbol).await {
            return TokenData::new(token.metadata(), price, PriceStatus::Cached);
        }

        let body = match self.scraper.fetch(&token.source_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Error fetching {symbol} market data, using fallback: {e}");
                return self.fallback_for(token);
            }
        };

        let now = self.cache.now().timestamp_millis();
        match parse_market_data(&body, &token.fields, now) {
            Ok(price) => {
                debug!("Current {symbol} price: {}", price.price);
                self.cache.insert(symbol, price.clone()).await;
                TokenData::new(token.metadata(), price, PriceStatus::Live)
            }
            Err(e) => {
                warn!("Unusable {symbol} market data, using fallback: {e}");
                self.fallback_for(token)
            }
        }
    }

    fn fallback_for(&self, token: &TokenConfig) -> TokenData {
        let price = token.fallback.at(self.cache.now().timestamp_millis());
        TokenData::new(token.metadata(), price, PriceStatus::Fallback)
    }
}
