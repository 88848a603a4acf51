use crate::config::{FieldPaths, SourceConfig};
use crate::data::TokenPrice;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use log::{debug, error};
use reqwest::Client;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Value>;
}

pub struct HttpScraper {
    client: Client,
    source: SourceConfig,
}

impl HttpScraper {
    pub fn new(source: SourceConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, source })
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn fetch(&self, url: &str) -> anyhow::Result<Value> {
        let mut request = self.client.get(url);
        if let (Some(header), Some(key)) = (&self.source.api_key_header, &self.source.api_key) {
            request = request.header(header.as_str(), key.as_str());
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.json::<Value>().await?;
        debug!("Fetched {url}");

        Ok(body)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no market data at `{0}`")]
    MissingData(String),
}

/// Builds a price from a source response. The record root must exist, every
/// numeric field inside it is optional and reads as zero when absent or malformed.
pub fn parse_market_data(
    body: &Value,
    fields: &FieldPaths,
    last_updated: i64,
) -> Result<TokenPrice, ParseError> {
    let root = match &fields.data_path {
        Some(path) => lookup(body, path),
        None => Some(body),
    }
    .filter(|root| root.is_object());

    let Some(root) = root else {
        let path = fields.data_path.clone().unwrap_or_else(|| "$".to_string());
        error!("Can't find market data, response {body}");
        return Err(ParseError::MissingData(path));
    };

    Ok(TokenPrice {
        price: numeric_field(root, &fields.price),
        change_24h: numeric_field(root, &fields.change_24h),
        volume_24h: numeric_field(root, &fields.volume_24h),
        market_cap: numeric_field(root, &fields.market_cap),
        liquidity: numeric_field(root, &fields.liquidity),
        last_updated,
    })
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => current.get(segment),
        })
}

/// Longest numeric text accepted from a source.
const MAX_NUMERIC_LEN: usize = 64;
/// Largest accepted magnitude of a decimal's exponent, keeps later arithmetic cheap.
const MAX_SCALE: i64 = 64;

fn numeric_field(root: &Value, path: &str) -> BigDecimal {
    let parsed = match lookup(root, path) {
        Some(Value::Number(number)) => bounded_decimal(&number.to_string()),
        Some(Value::String(text)) => bounded_decimal(text.trim()),
        _ => None,
    };

    parsed.unwrap_or_else(BigDecimal::zero)
}

fn bounded_decimal(text: &str) -> Option<BigDecimal> {
    if text.len() > MAX_NUMERIC_LEN {
        debug!("Ignoring oversized number {text:.16}...");
        return None;
    }

    let value = BigDecimal::from_str(text).ok()?;
    let (_, scale) = value.as_bigint_and_exponent();
    if !(-MAX_SCALE..=MAX_SCALE).contains(&scale) {
        debug!("Ignoring out of range number {text}");
        return None;
    }

    Some(value)
}
