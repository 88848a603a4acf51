//! SPL token balance lookups against a Solana JSON-RPC node.
//!
//! Two readers exist and the config picks one:
//! - `parsed` lets the node decode the account (`jsonParsed` encoding)
//! - `raw` fetches base64 account bytes and decodes the SPL layout locally
//!
//! SPL token account layout (first 165 bytes):
//! - Offset 0-31:  mint (Pubkey)
//! - Offset 32-63: owner (Pubkey)
//! - Offset 64-71: amount (u64 LE)
//!
//! Mint layout (first 82 bytes): decimals at offset 44.

use crate::config::{AccountsConfig, ReaderKind};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bigdecimal::BigDecimal;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const TOKEN_ACCOUNT_LEN: usize = 165;
pub const MINT_LEN: usize = 82;
const MINT_DECIMALS_OFFSET: usize = 44;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("RPC request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Account not found: {0}")]
    NotFound(String),
    #[error("Data too short: expected {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },
    #[error("Invalid account encoding: {0}")]
    Encoding(String),
    #[error("Unexpected RPC response: {0}")]
    UnexpectedShape(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account: String,
    pub mint: String,
    pub owner: String,
    pub amount: String,
    pub decimals: u8,
    pub ui_amount: BigDecimal,
}

impl TokenBalance {
    fn new(account: &str, mint: String, owner: String, amount: u64, decimals: u8) -> Self {
        Self {
            account: account.to_string(),
            mint,
            owner,
            amount: amount.to_string(),
            decimals,
            ui_amount: BigDecimal::new(amount.into(), i64::from(decimals)),
        }
    }
}

#[async_trait]
pub trait AccountReader: Send + Sync {
    async fn token_balance(&self, token_account: &str) -> Result<TokenBalance, AccountError>;
}

pub fn account_reader(
    config: &AccountsConfig,
    timeout: Duration,
) -> Result<Arc<dyn AccountReader>, AccountError> {
    let rpc = RpcClient::new(config.rpc_url.clone(), timeout)?;
    let reader: Arc<dyn AccountReader> = match config.reader {
        ReaderKind::Parsed => Arc::new(ParsedAccountReader::new(rpc)),
        ReaderKind::Raw => Arc::new(RawAccountReader::new(rpc)),
    };
    Ok(reader)
}

/// Minimal JSON-RPC 2.0 client, only what the readers need.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AccountError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Returns `result.value` of a `getAccountInfo` call, `None` when the account does not exist.
    async fn get_account_info(
        &self,
        address: &str,
        encoding: &str,
    ) -> Result<Option<Value>, AccountError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAccountInfo",
            "params": [address, {"encoding": encoding, "commitment": "confirmed"}]
        });
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(AccountError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let value = response
            .get("result")
            .and_then(|result| result.get("value"))
            .ok_or_else(|| AccountError::UnexpectedShape(response.to_string()))?;

        debug!("getAccountInfo({address}, {encoding}) answered");
        Ok((!value.is_null()).then(|| value.clone()))
    }
}

pub struct ParsedAccountReader {
    rpc: RpcClient,
}

impl ParsedAccountReader {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl AccountReader for ParsedAccountReader {
    async fn token_balance(&self, token_account: &str) -> Result<TokenBalance, AccountError> {
        let value = self
            .rpc
            .get_account_info(token_account, "jsonParsed")
            .await?
            .ok_or_else(|| AccountError::NotFound(token_account.to_string()))?;

        let info = value
            .pointer("/data/parsed/info")
            .ok_or_else(|| AccountError::UnexpectedShape("missing parsed account info".into()))?;
        let text = |path: &str| {
            info.pointer(path)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AccountError::UnexpectedShape(format!("missing {path}")))
        };

        let mint = text("/mint")?;
        let owner = text("/owner")?;
        let amount = text("/tokenAmount/amount")?
            .parse::<u64>()
            .map_err(|e| AccountError::UnexpectedShape(format!("bad token amount: {e}")))?;
        let decimals = info
            .pointer("/tokenAmount/decimals")
            .and_then(Value::as_u64)
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| AccountError::UnexpectedShape("missing decimals".into()))?;

        Ok(TokenBalance::new(token_account, mint, owner, amount, decimals))
    }
}

pub struct RawAccountReader {
    rpc: RpcClient,
}

impl RawAccountReader {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    async fn account_bytes(&self, address: &str) -> Result<Vec<u8>, AccountError> {
        let value = self
            .rpc
            .get_account_info(address, "base64")
            .await?
            .ok_or_else(|| AccountError::NotFound(address.to_string()))?;

        let encoded = value
            .pointer("/data/0")
            .and_then(Value::as_str)
            .ok_or_else(|| AccountError::UnexpectedShape("missing base64 data".into()))?;

        STANDARD
            .decode(encoded)
            .map_err(|e| AccountError::Encoding(e.to_string()))
    }
}

#[async_trait]
impl AccountReader for RawAccountReader {
    async fn token_balance(&self, token_account: &str) -> Result<TokenBalance, AccountError> {
        let account = parse_token_account(&self.account_bytes(token_account).await?)?;
        let decimals = parse_mint_decimals(&self.account_bytes(&account.mint).await?)?;

        Ok(TokenBalance::new(
            token_account,
            account.mint,
            account.owner,
            account.amount,
            decimals,
        ))
    }
}

#[derive(Debug, PartialEq)]
pub struct RawTokenAccount {
    pub mint: String,
    pub owner: String,
    pub amount: u64,
}

pub fn parse_token_account(data: &[u8]) -> Result<RawTokenAccount, AccountError> {
    if data.len() < TOKEN_ACCOUNT_LEN {
        return Err(AccountError::DataTooShort {
            expected: TOKEN_ACCOUNT_LEN,
            actual: data.len(),
        });
    }

    let mut amount = [0u8; 8];
    amount.copy_from_slice(&data[64..72]);

    Ok(RawTokenAccount {
        mint: bs58::encode(&data[0..32]).into_string(),
        owner: bs58::encode(&data[32..64]).into_string(),
        amount: u64::from_le_bytes(amount),
    })
}

pub fn parse_mint_decimals(data: &[u8]) -> Result<u8, AccountError> {
    if data.len() < MINT_LEN {
        return Err(AccountError::DataTooShort {
            expected: MINT_LEN,
            actual: data.len(),
        });
    }

    Ok(data[MINT_DECIMALS_OFFSET])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, mock};
    use std::io::Write;
    use std::str::FromStr;
    use tracing_unwrap::ResultExt;

    const MINT: [u8; 32] = [7u8; 32];
    const OWNER: [u8; 32] = [9u8; 32];

    fn token_account_bytes(amount: u64) -> Vec<u8> {
        let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
        data[0..32].copy_from_slice(&MINT);
        data[32..64].copy_from_slice(&OWNER);
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        data
    }

    fn mint_bytes(decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; MINT_LEN];
        data[MINT_DECIMALS_OFFSET] = decimals;
        data
    }

    fn account_info_body(data: &[u8]) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": {"slot": 1},
                "value": {
                    "data": [STANDARD.encode(data), "base64"],
                    "lamports": 2039280,
                    "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_token_account() {
        let account = parse_token_account(&token_account_bytes(1_500_000)).unwrap_or_log();

        assert_eq!(account.mint, bs58::encode(MINT).into_string());
        assert_eq!(account.owner, bs58::encode(OWNER).into_string());
        assert_eq!(account.amount, 1_500_000);
    }

    #[test]
    fn test_parse_rejects_short_buffers() {
        let err = parse_token_account(&[0u8; 72]).unwrap_err();
        assert!(matches!(
            err,
            AccountError::DataTooShort {
                expected: TOKEN_ACCOUNT_LEN,
                actual: 72
            }
        ));

        assert!(parse_mint_decimals(&[0u8; 45]).is_err());
        assert_eq!(parse_mint_decimals(&mint_bytes(9)).unwrap_or_log(), 9);
    }

    #[test]
    fn test_ui_amount_applies_decimals() {
        let balance = TokenBalance::new("acc", "m".into(), "o".into(), 1_500_000, 6);

        assert_eq!(balance.amount, "1500000");
        assert_eq!(balance.ui_amount, BigDecimal::from_str("1.5").unwrap_or_log());
    }

    #[tokio::test]
    async fn test_raw_reader_reads_account_and_mint() {
        let account_address = "RawTokenAccount1111111111111111111111111111";
        let mint_address = bs58::encode(MINT).into_string();

        let account_mock = mock("POST", "/rpc/raw")
            .match_body(Matcher::Regex(account_address.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(account_info_body(&token_account_bytes(2_500_000_000)))
            .create();
        let mint_mock = mock("POST", "/rpc/raw")
            .match_body(Matcher::Regex(mint_address.clone()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(account_info_body(&mint_bytes(9)))
            .create();

        let reader = account_reader(
            &AccountsConfig {
                rpc_url: format!("{}/rpc/raw", mockito::server_url()),
                reader: ReaderKind::Raw,
            },
            Duration::from_secs(5),
        )
        .unwrap_or_log();
        let balance = reader.token_balance(account_address).await.unwrap_or_log();

        account_mock.assert();
        mint_mock.assert();
        assert_eq!(balance.mint, mint_address);
        assert_eq!(balance.owner, bs58::encode(OWNER).into_string());
        assert_eq!(balance.decimals, 9);
        assert_eq!(balance.ui_amount, BigDecimal::from_str("2.5").unwrap_or_log());
    }

    #[tokio::test]
    async fn test_parsed_reader() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": {"slot": 1},
                "value": {
                    "data": {
                        "program": "spl-token",
                        "parsed": {
                            "type": "account",
                            "info": {
                                "mint": "7BgBvyjrZX1YKz4oh9mjb8ZScatkkwb8DzFx7LoiVkM3",
                                "owner": "OwnerWallet11111111111111111111111111111111",
                                "tokenAmount": {
                                    "amount": "123450000000",
                                    "decimals": 9,
                                    "uiAmountString": "123.45"
                                }
                            }
                        }
                    }
                }
            }
        });
        let _m = mock("POST", "/rpc/parsed")
            .match_body(Matcher::Regex("jsonParsed".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create();

        let reader = account_reader(
            &AccountsConfig {
                rpc_url: format!("{}/rpc/parsed", mockito::server_url()),
                reader: ReaderKind::Parsed,
            },
            Duration::from_secs(5),
        )
        .unwrap_or_log();
        let balance = reader.token_balance("ParsedAccount").await.unwrap_or_log();

        assert_eq!(balance.mint, "7BgBvyjrZX1YKz4oh9mjb8ZScatkkwb8DzFx7LoiVkM3");
        assert_eq!(balance.amount, "123450000000");
        assert_eq!(balance.decimals, 9);
        assert_eq!(
            balance.ui_amount,
            BigDecimal::from_str("123.45").unwrap_or_log()
        );
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let _m = mock("POST", "/rpc/missing")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"context":{"slot":1},"value":null}}"#)
            .create();

        let reader = account_reader(
            &AccountsConfig {
                rpc_url: format!("{}/rpc/missing", mockito::server_url()),
                reader: ReaderKind::Parsed,
            },
            Duration::from_secs(5),
        )
        .unwrap_or_log();
        let err = reader.token_balance("Nope").await.unwrap_err();

        assert!(matches!(err, AccountError::NotFound(address) if address == "Nope"));
    }

    #[tokio::test]
    async fn test_stalled_rpc_times_out() {
        let _m = mock("POST", "/rpc/stalled")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_fn(|w| {
                std::thread::sleep(std::time::Duration::from_millis(1_000));
                w.write_all(br#"{"jsonrpc":"2.0","id":1,"result":{"value":null}}"#)
            })
            .create();

        let reader = account_reader(
            &AccountsConfig {
                rpc_url: format!("{}/rpc/stalled", mockito::server_url()),
                reader: ReaderKind::Parsed,
            },
            Duration::from_millis(100),
        )
        .unwrap_or_log();
        let err = reader.token_balance("Slow").await.unwrap_err();

        assert!(matches!(err, AccountError::Transport(e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let _m = mock("POST", "/rpc/error")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid param"}}"#,
            )
            .create();

        let reader = account_reader(
            &AccountsConfig {
                rpc_url: format!("{}/rpc/error", mockito::server_url()),
                reader: ReaderKind::Raw,
            },
            Duration::from_secs(5),
        )
        .unwrap_or_log();
        let err = reader.token_balance("Bad").await.unwrap_err();

        assert!(matches!(err, AccountError::Rpc { code: -32602, .. }));
    }
}
