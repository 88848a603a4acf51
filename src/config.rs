use crate::data::{Network, TokenMetadata, TokenPrice};
use anyhow::{bail, ensure};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u32,
    pub refresh_interval_sec: u32,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
    #[serde(default)]
    pub source: SourceConfig,
    pub accounts: AccountsConfig,
    pub tokens: Vec<TokenConfig>,
}

fn default_cache_ttl_ms() -> u64 {
    30_000
}

fn default_request_timeout_sec() -> u64 {
    10
}

/// Credentials attached to every market data request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub api_key_header: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderKind {
    Parsed,
    Raw,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub rpc_url: String,
    pub reader: ReaderKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub name: String,
    pub contract_address: String,
    pub network: Network,
    pub logo_url: String,
    #[serde(default)]
    pub verified: bool,
    pub source_url: String,
    #[serde(default)]
    pub fields: FieldPaths,
    pub fallback: FallbackPrice,
}

impl TokenConfig {
    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            contract_address: self.contract_address.clone(),
            network: self.network,
            logo_url: self.logo_url.clone(),
            verified: self.verified,
        }
    }
}

/// Where each value lives inside a source response. Paths are dot separated,
/// numeric segments index into arrays.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPaths {
    pub data_path: Option<String>,
    pub price: String,
    pub change_24h: String,
    pub volume_24h: String,
    pub market_cap: String,
    pub liquidity: String,
}

impl Default for FieldPaths {
    fn default() -> Self {
        Self {
            data_path: None,
            price: "price".to_string(),
            change_24h: "change24h".to_string(),
            volume_24h: "volume24h".to_string(),
            market_cap: "marketCap".to_string(),
            liquidity: "liquidity".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FallbackPrice {
    pub price: BigDecimal,
    pub change_24h: BigDecimal,
    pub volume_24h: BigDecimal,
    pub market_cap: BigDecimal,
    pub liquidity: BigDecimal,
}

impl FallbackPrice {
    pub fn at(&self, last_updated: i64) -> TokenPrice {
        TokenPrice {
            price: self.price.clone(),
            change_24h: self.change_24h.clone(),
            volume_24h: self.volume_24h.clone(),
            market_cap: self.market_cap.clone(),
            liquidity: self.liquidity.clone(),
            last_updated,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let toml_str = fs::read_to_string(path)?;
        Self::from_toml(&toml_str)
    }

    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.tokens.is_empty(), "at least one token must be configured");
        ensure!(self.cache_ttl_ms > 0, "cache_ttl_ms must be positive");
        ensure!(
            self.refresh_interval_sec > 0,
            "refresh_interval_sec must be positive"
        );

        let mut seen = HashSet::new();
        for token in &self.tokens {
            if !seen.insert(token.symbol.to_ascii_uppercase()) {
                bail!("duplicate token symbol {}", token.symbol);
            }
        }

        Ok(())
    }
}
