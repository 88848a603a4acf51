use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Solana,
    Base,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub contract_address: String,
    pub network: Network,
    pub logo_url: String,
    pub verified: bool,
}

/// Market numbers for one token, all in USD except `change_24h` (percent).
/// `last_updated` is epoch milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPrice {
    pub price: BigDecimal,
    pub change_24h: BigDecimal,
    pub volume_24h: BigDecimal,
    pub market_cap: BigDecimal,
    pub liquidity: BigDecimal,
    pub last_updated: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceStatus {
    /// Fetched from the source by this request.
    Live,
    /// Served from a cache entry younger than the TTL.
    Cached,
    /// Source unavailable or unusable, configured substitute returned.
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TokenData {
    #[serde(flatten)]
    pub metadata: TokenMetadata,
    #[serde(flatten)]
    pub price: TokenPrice,
    pub status: PriceStatus,
}

impl TokenData {
    pub fn new(metadata: TokenMetadata, price: TokenPrice, status: PriceStatus) -> Self {
        Self {
            metadata,
            price,
            status,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub total_market_cap: BigDecimal,
    pub total_volume_24h: BigDecimal,
    pub total_liquidity: BigDecimal,
    pub token_count: usize,
    pub fallback_count: usize,
    pub generated_at: i64,
}

impl MarketSummary {
    pub fn from_tokens(tokens: &[TokenData], generated_at: i64) -> Self {
        let mut summary = MarketSummary {
            total_market_cap: BigDecimal::from(0),
            total_volume_24h: BigDecimal::from(0),
            total_liquidity: BigDecimal::from(0),
            token_count: tokens.len(),
            fallback_count: 0,
            generated_at,
        };

        for token in tokens {
            summary.total_market_cap += &token.price.market_cap;
            summary.total_volume_24h += &token.price.volume_24h;
            summary.total_liquidity += &token.price.liquidity;
            if token.status == PriceStatus::Fallback {
                summary.fallback_count += 1;
            }
        }

        summary
    }
}
