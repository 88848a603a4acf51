use crate::accounts::account_reader;
use crate::app::App;
use crate::clock::SystemClock;
use crate::scraper::HttpScraper;
use crate::service::TokenPriceService;
use chrono::TimeDelta;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

mod accounts;
mod app;
mod cache;
mod clock;
mod config;
mod data;
mod scraper;
mod service;
mod web;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    info!("Starting the application...");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::Config::from_file(std::path::Path::new(&config_path))?;
    info!(
        "Loaded {} tokens, {:?} account reader",
        config.tokens.len(),
        config.accounts.reader
    );

    let request_timeout = Duration::from_secs(config.request_timeout_sec);
    let scraper = HttpScraper::new(config.source.clone(), request_timeout)?;
    let service = Arc::new(TokenPriceService::new(
        config.tokens.clone(),
        scraper,
        TimeDelta::milliseconds(config.cache_ttl_ms as i64),
        Arc::new(SystemClock),
    ));
    let accounts = account_reader(&config.accounts, request_timeout)?;

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for shutdown signal: {e}");
        }
        shutdown_token.cancel();
    });

    let mut app = App::new(config, service, accounts);

    app.run(cancellation_token).await?;

    Ok(())
}
